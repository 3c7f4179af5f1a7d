//! Editable rule tables.
//!
//! Everything the pipeline matches against lives here as data: topic
//! keywords (in document order), relevance and exclusion patterns, the
//! generalization lookup, answer-cleaning markers and the fixed document
//! frame. Tables load from TOML; `RuleSet::default_rules()` carries the
//! built-in German travel-support set.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::CATCH_ALL_TOPIC;
use crate::error::RulesError;

/// A topic and the keyword phrases that select it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRule {
    /// Stable label used in assignments and exports.
    pub key: String,
    /// Section heading in the knowledge document.
    pub title: String,
    /// Case-insensitive substrings; one hit assigns the topic.
    pub keywords: Vec<String>,
}

/// Exact-text rewrite of a case-specific sentence into general wording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generalization {
    pub from: String,
    pub to: String,
}

/// Markers for stripping quotes, forwarded headers and signatures from
/// support replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanerRules {
    /// "X wrote on <date>:" markers; text is cut from the match onward.
    pub quote_markers: Vec<String>,
    /// "Original message" separators; text is cut from the match onward.
    pub separators: Vec<String>,
    /// Forwarded From/To/Date header runs; removed up to the next blank line.
    pub forwarded_headers: Vec<String>,
    /// Closing phrase followed by the organization's signature marker;
    /// text is cut from the match onward.
    pub signature_patterns: Vec<String>,
    /// Fixed legal-registration string used when no signature pattern hit.
    #[serde(default)]
    pub legal_marker: Option<String>,
    /// Greeting or contact-line markers searched backwards from the legal
    /// marker.
    #[serde(default)]
    pub legal_backoff: Vec<String>,
}

/// Patterns deciding which sentences are knowledge candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorRules {
    /// Pure greeting or closing fragments.
    pub greeting_patterns: Vec<String>,
    /// Quote headers and address tokens that make a sentence case-specific.
    pub quote_patterns: Vec<String>,
    /// Policy-like wording; any hit makes a sentence relevant.
    pub policy_patterns: Vec<String>,
    /// E-mail and phone tokens that disqualify the long-sentence fallback.
    pub contact_patterns: Vec<String>,
}

/// Fixed frame of the knowledge document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRules {
    pub header_lines: Vec<String>,
    pub facts_heading: String,
    /// Authoritative facts, emitted verbatim and never filtered.
    pub reference_facts: Vec<String>,
    pub trailer_lines: Vec<String>,
}

/// The complete, ordered rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Topics in document order; the first topic claims shared statements.
    pub topics: Vec<TopicRule>,
    /// Label assigned when no topic keyword matches.
    #[serde(default = "default_catch_all")]
    pub catch_all: String,
    pub extractor: ExtractorRules,
    /// Case-specific content that must never reach the document.
    pub exclusion_patterns: Vec<String>,
    #[serde(default)]
    pub generalizations: Vec<Generalization>,
    pub cleaner: CleanerRules,
    pub document: DocumentRules,
}

fn default_catch_all() -> String {
    CATCH_ALL_TOPIC.to_string()
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::default_rules()
    }
}

impl RuleSet {
    /// Load and validate a rule set from a TOML file.
    pub async fn load(path: &Path) -> Result<Self, RulesError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| RulesError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let rules = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), topics = rules.topics.len(), "Loaded rule tables");
        Ok(rules)
    }

    /// Parse and validate a rule set from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, RulesError> {
        let rules: Self = toml::from_str(text)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Serialize to TOML, for writing an editable copy of the defaults.
    pub fn to_toml(&self) -> Result<String, RulesError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check that every pattern compiles and the topic table is usable.
    pub fn validate(&self) -> Result<(), RulesError> {
        if self.topics.is_empty() {
            return Err(RulesError::Empty {
                table: "topics".into(),
            });
        }
        compile_patterns("extractor.greeting_patterns", &self.extractor.greeting_patterns)?;
        compile_patterns("extractor.quote_patterns", &self.extractor.quote_patterns)?;
        compile_patterns("extractor.policy_patterns", &self.extractor.policy_patterns)?;
        compile_patterns("extractor.contact_patterns", &self.extractor.contact_patterns)?;
        compile_patterns("exclusion_patterns", &self.exclusion_patterns)?;
        compile_patterns("cleaner.quote_markers", &self.cleaner.quote_markers)?;
        compile_patterns("cleaner.separators", &self.cleaner.separators)?;
        compile_patterns("cleaner.forwarded_headers", &self.cleaner.forwarded_headers)?;
        compile_patterns("cleaner.signature_patterns", &self.cleaner.signature_patterns)?;
        Ok(())
    }

    /// Title for a topic key; the catch-all uses its own label.
    pub fn topic_title(&self, key: &str) -> Option<&str> {
        self.topics
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.title.as_str())
            .or_else(|| (key == self.catch_all).then_some(self.catch_all.as_str()))
    }

    /// Create the built-in rule set.
    pub fn default_rules() -> Self {
        Self {
            topics: default_topics(),
            catch_all: default_catch_all(),
            extractor: ExtractorRules {
                greeting_patterns: strings(&[
                    r"^(beste grüße|viele grüße|freundliche grüße|mit freundlichen grüßen|mit freundlichen|guten tag|moin|hallo|sehr geehrte damen und herren)[\s,.!]*$",
                ]),
                quote_patterns: strings(&[
                    r"hat am \d{1,2}\.\d{1,2}\.\d{2,4}",
                    r"<(?:mailto:)?[^>]+>",
                ]),
                policy_patterns: strings(&[
                    r"\bwir sind\b",
                    r"\bwir haben\b",
                    r"\bwir übernehmen\b",
                    r"\bwir empfehlen\b",
                    r"\bwir versenden\b",
                    r"\bwir bieten\b",
                    r"\bes gilt\b",
                    r"\blaut\b",
                    r"\bgemäß\b",
                    r"\bvoraussetzung\b",
                    r"\bbitte (rufen|senden|wenden|teilen|beachten)\b",
                    r"\bsollten sie\b",
                    r"\bder wert (der reise )?kann nicht\b",
                    r"\bdie (reise|stornierung|adresse)\b",
                    r"\berst (ab|wenn)\b",
                    r"\bin keiner form\b",
                    r"\bdas sind nicht wir\b",
                    r"\bdie (sperrung|umstellung|endgültige)\b",
                    r"\bstornierungen sind\b",
                    r"\brechtssicher\b",
                    r"\bagb\b",
                    r"\breiserecht\b",
                    r"\bwww\.usd\.reisen\b",
                ]),
                contact_patterns: strings(&[
                    r"@",
                    r"geschrieben",
                    r"telefon.*\d{5}",
                    r"\+?\d[\d /()-]{7,}\d",
                ]),
            },
            exclusion_patterns: strings(&[
                // greetings addressed to a person
                r"\b(hallo|moin|liebe|lieber|sehr geehrte|sehr geehrter|guten tag)\s+(frau|herr|familie)\b",
                r"hallo liebe reisefreundin|hallo lieber reisefreund",
                // booking and customer numbers
                r"buchungsnummer\s*:?\s*\d+|kundennr\.?\s*:?\s*\d+|vorgangsnummer\s*:?\s*\d+",
                r"\b\d{6,}\b",
                // amounts
                r"\d+(?:[.,]\d+)*\s*(?:€|eur\b|euro\b)|€\s*\d|\d+,-",
                // dates and times of a single case
                r"\b\d{1,2}\.\d{1,2}\.\d{2,4}\b",
                r"\b\d{1,2}:\d{2}\b",
                // customer quotes
                r"^ich (bin|habe|fordere|bitte)\b|^ansonsten behalte ich|^desweiteren bitte ich",
                r"bitte sagt mir|woher sie meine|selbstverständlich sofort als spam",
                r"muss diese im system stornieren|mandantin|landingpage aber was anderes steht",
                r"^und freuen uns|^oder sind sie vielleicht",
                r"nachdrücklich.*unterstellungen verwahren",
                // automated disclaimers
                r"diese e-mail ist eine automatisierte|keine beantwortung ihrer e-mail dar",
                r"nur zur versendung.*eingerichtet|keine eingehenden e-mails empfangen",
            ]),
            generalizations: default_generalizations(),
            cleaner: CleanerRules {
                quote_markers: strings(&[
                    r"(?s)\s+\S+(?:[ \t]+\S+){0,3}?(?:\s+<[^>]+>)?\s+hat am\s+\d{1,2}\.\d{1,2}\.\d{2,4}.{0,60}?geschrieben:",
                    r"(?im)^[ \t]*am\s+\d{1,2}\.\d{1,2}\.\d{2,4}.{0,160}schrieb.{0,160}:[ \t]*$",
                    r"(?im)^[ \t]*on\s+.{0,160}\s+wrote:[ \t]*$",
                ]),
                separators: strings(&[
                    r"(?i)\s*-{3,}\s*(ursprüngliche nachricht|original message|weitergeleitete nachricht|forwarded message)\s*-{3,}",
                ]),
                forwarded_headers: strings(&[
                    r"(?is)\s*(?:von|from):[ \t]*[^\n]+\s+(?:an|to):[ \t]*[^\n]+\s+(?:datum|date|gesendet|sent):.*?(\n\n|\z)",
                ]),
                signature_patterns: strings(&[
                    r"(?i)(beste grüße|mit freundlichen grüßen|guten tag,?)\s*,?\s*(ihr )?reiseteam (vom )?urlaubs service deutschland\s*(tel\.?:|achtung|internet:)",
                ]),
                legal_marker: Some("Sitz und Registergericht Oldenburg HRA 205897".into()),
                legal_backoff: strings(&["Beste Grüße", "Tel.:", "Internet: www"]),
            },
            document: DocumentRules {
                header_lines: strings(&[
                    "# WISSENSTEXT FÜR KI-SUPPORT-AGENT",
                    "# Urlaubs Service Deutschland (USD Reisen) / Reiseteam",
                    "#",
                    "# Erzeugt aus den zugeordneten Kundendienst-Paaren:",
                    "# 1) Pairing + Bereinigung, 2) Themen + Satzextraktion + Häufigkeit,",
                    "# 3) Filter + Generalisierung → reines Wissen, keine Beispiele.",
                ]),
                facts_heading: "## STAMMDATEN (Kontakt, Unternehmen)".into(),
                reference_facts: strings(&[
                    "USD Reisen (Urlaubs Service Deutschland) ist ein Online-Reisebüro ohne stationäre Geschäfte oder Büros.",
                    "Reisen sind bei der R+V gegen Insolvenz abgesichert (Reisesicherungsschein); dieser wird mit der Anmeldebestätigung mitgesendet.",
                    "Telefon: 0049 (0) 4431 74 89 440. Aus Österreich/Schweiz: 0049 4431 748 9440.",
                    "Öffnungszeiten: Montag–Dienstag 09:00–18:00 Uhr, Mittwoch–Freitag 09:00–12:00 Uhr (aktuelle Angaben auf der Website prüfen).",
                    "Website: www.usd.reisen. AGB und Reiseinfos unter www.usd.reisen.",
                    "Stornierung: ausschließlich per E-Mail an buchung@usd.reisen oder rechtssicher per Einschreiben an die Adresse des Reiseveranstalters (steht auf der Anmeldebestätigung). E-Mails an reiseteam@ werden nicht inhaltlich beantwortet.",
                    "Sitz: Registergericht Oldenburg HRA 205897. USt-IdNr. § 27: DE318355174.",
                ]),
                trailer_lines: strings(&[
                    "Ende des Wissenstexts. Quelle: report.md, candidates.json.",
                ]),
            },
        }
    }
}

/// Compile a pattern table, naming the offending entry on failure.
///
/// Patterns always match case-insensitively; inline flags may add more.
pub fn compile_patterns(table: &str, patterns: &[String]) -> Result<Vec<Regex>, RulesError> {
    patterns
        .iter()
        .enumerate()
        .map(|(i, pattern)| {
            Regex::new(&format!("(?i){pattern}")).map_err(|source| RulesError::InvalidPattern {
                rule: format!("{table}[{i}]"),
                source,
            })
        })
        .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn topic(key: &str, title: &str, keywords: &[&str]) -> TopicRule {
    TopicRule {
        key: key.into(),
        title: title.into(),
        keywords: strings(keywords),
    }
}

fn default_topics() -> Vec<TopicRule> {
    vec![
        topic(
            "Kontakt_Öffnungszeiten",
            "Unternehmen & Kontakt",
            &[
                "telefon", "04431", "4431 74 89", "öffnungszeiten", "montag", "freitag",
                "usd.reisen", "online-reisebüro", "stationäre", "reisesicherungsschein", "r+v",
            ],
        ),
        topic(
            "Gutschein_Partner",
            "Gutscheine & Partner",
            &[
                "gutschein", "versender", "aussteller", "incentiv", "dankeschön", "partner",
                "unternehmen nutzen", "reiseabwicklung erst ab einlösung", "keinerlei daten",
                "haben wir nicht", "nicht wir", "absender der nachricht",
                "postadresse des ausstellers", "original vorliegt", "nicht in bar",
            ],
        ),
        topic(
            "Werbung_Datenschutz",
            "Werbung & Datenschutz",
            &[
                "sperrung der daten", "werbung", "angebote", "vier wochen", "umstellung",
                "newsletter", "widerspruch", "löschung", "datenschutz", "dsgvo", "werbeliste",
                "daten löschen",
            ],
        ),
        topic(
            "Stornierung_Rücktritt",
            "Stornierung & Rücktritt",
            &[
                "stornierung", "stornieren", "rücktritt", "reiserücktritt", "stornorechnung",
                "stornokosten", "agb", "reiserecht", "einschreiben", "buchung@usd.reisen",
                "rechtssicher", "stornobedingungen",
            ],
        ),
        topic(
            "Reiseunterlagen_Abholzeit",
            "Reiseunterlagen & Abholzeit",
            &[
                "fahrausweis", "voucher", "7-10 tage", "14 tage vor", "abholzeit", "haltestelle",
                "restzahlung", "reiseunterlagen", "detailplanung", "streckenzusammenstellung",
            ],
        ),
        topic(
            "Zahlung_Rückerstattung",
            "Zahlung & Rückerstattung",
            &[
                "zahlung", "überweisung", "iban", "rückerstattung", "rückzahlung",
                "verrechnungsscheck", "anzahlung", "restzahlung", "lastschrift", "mandat",
            ],
        ),
        topic(
            "Versicherung",
            "Versicherung",
            &[
                "versicherung", "reiserücktritt", "rücktrittskostenversicherung", "travelsecure",
                "reisekranken", "kranken-abbruch",
            ],
        ),
        topic(
            "Sonstiges_Recht_Adresse",
            "Sonstiges (Recht, Adresse)",
            &[
                "rechtsanwalt", "briefpost", "adresse", "daten ändern", "umbuchung",
                "andere person",
            ],
        ),
    ]
}

fn generalization(from: &str, to: &str) -> Generalization {
    Generalization {
        from: from.into(),
        to: to.into(),
    }
}

fn default_generalizations() -> Vec<Generalization> {
    vec![
        generalization(
            "Wir haben die Sperrung der Daten, für weitere Übersendungen von Werbung und Angeboten aus unserem Unternehmen, vorgenommen.",
            "Die Sperrung der Daten für weitere Übersendungen von Werbung und Angeboten wird auf Wunsch vorgenommen.",
        ),
        generalization(
            "Die endgültige Umstellung kann aber etwa vier Wochen betragen.",
            "Die endgültige Umstellung kann etwa vier Wochen dauern.",
        ),
        generalization(
            "WIR HABEN KEINERLEI DATEN VON IHNEN.",
            "Bei reinen Gutschein-Empfängern (ohne Anmeldung zur Reise) hat USD keinerlei Daten von der Person.",
        ),
        generalization(
            "Wir sind in keiner Form mit Ihnen in Kontakt getreten.",
            "USD ist bei Gutschein-/Partner-Anfragen in keiner Form mit der Person in Kontakt getreten (Kontakt läuft über den Partner).",
        ),
        generalization(
            "Guten Tag, wir sind Reiseveranstalter von Incentivs für verschiedene Firmen und Unternehmen sind.",
            "USD Reisen ist Reiseveranstalter von Incentive-Reisen für verschiedene Firmen und Unternehmen.",
        ),
        generalization(
            "Diese Unternehmen nutzen unsere Reisen als Dankeschön für Ihre Kunden.",
            "Partner-Unternehmen nutzen USD-Reisen als Dankeschön für ihre Kunden (z. B. Reisegutschein, Paketbeilage).",
        ),
        generalization(
            "Sollten Sie einen Gutschein für eine Reise, also die Möglichkeit zur Teilnahme an einer Reise erhalten haben, so erfahren wir auch Ihre Daten erst durch Ihre persönliche Anmeldung.",
            "Kundendaten erhält USD erst durch die persönliche Anmeldung zur Reise (Einlösung des Gutscheins).",
        ),
        generalization(
            "Wenden Sie sich diesbezüglich bitte an den Absender der Nachricht Ihres Angebotes welcher Ihnen einen Reisegutschein mit einer Reise von uns zukommen lassen hat.",
            "Bei Gutschein-/Werbebeschwerden soll sich der Kunde an den Absender des Gutscheins bzw. der Werbung wenden (auf dem Gutschein steht die Postadresse des Ausstellers).",
        ),
        generalization(
            "Auf dem Gutschein sollte die Postadresse des Ausstellers stehen.",
            "Die Postadresse des Gutschein-Ausstellers steht in der Regel auf dem Gutschein.",
        ),
        generalization(
            "Der Wert der Reise kann nicht in Bar ausgezahlt werden.",
            "Der Wert eines Reisegutscheins kann nicht in Bar ausgezahlt werden.",
        ),
        generalization(
            "Wir übernehmen die Reiseabwicklung erst ab der Einlösung durch den Kunden.",
            "USD übernimmt die Reiseabwicklung erst ab Einlösung des Gutscheins durch den Kunden.",
        ),
        generalization(
            "Guten Tag, wenden Sie sich bitte an den Versender des Gutscheins, das sind nicht wir.",
            "USD ist nicht der Versender von Gutscheinen; Gutscheinaussteller sind die Partner.",
        ),
        generalization(
            "Wichtig ist, wir vom Urlaubs Service Deutschland versenden keine Gutscheine!",
            "USD Reisen versendet keine Gutscheine; diese kommen von Partnern.",
        ),
        generalization(
            "Unabhängig davon sind Reisestornierungen laut Reiserecht, niemals kostenfrei.",
            "Reisestornierungen sind laut Reiserecht niemals automatisch kostenfrei; es gelten die AGB.",
        ),
        generalization(
            "Laut den AGB des Reiseveranstalters: 6.8 Der Reiseveranstalter behält sich vor, anstelle der vorstehenden Pauschalen eine höhere, konkrete Entschädigung zu fordern, soweit der Reiseveranstalter nachweist, dass ihm wesentlich höhere Aufwendungen als die jeweils anwendbare Pauschale entstanden sind.",
            "Laut AGB kann der Reiseveranstalter bei Nachweis wesentlich höherer Aufwendungen eine höhere als die Pauschal-Stornierung fordern (AGB 6.8).",
        ),
        generalization(
            "In diesem Fall ist der Reiseveranstalter verpflichtet, die geforderte Entschädigung unter Berücksichtigung der ersparten Aufwendungen und einer etwaigen, anderweitigen Verwendung der Reiseleistungen konkret zu beziffern und zu belegen.",
            "Die höhere Entschädigung muss konkret beziffert und belegt werden (ersparte Aufwendungen, anderweitige Verwendung der Reiseleistungen).",
        ),
        generalization(
            "Wir senden Ihnen hiermit die Originalrechnung zur Einreichung bei Ihrer Versicherung zu.",
            "Auf Wunsch kann die Originalrechnung zur Einreichung bei der Versicherung (z. B. Rücktrittskostenversicherung) zugesandt werden; bei Rückfragen kann die Versicherung sich an USD wenden.",
        ),
        generalization(
            "Um auch spät buchenden Gästen den Zustieg wohnortnah zu ermöglichen, erfolgt die Detailplanung der Streckenzusammenstellung, Fahr- und Abholzeit circa 14 Tage vor Reisebeginn.",
            "Die Detailplanung (Strecke, Abholzeit, Haltestelle) erfolgt etwa 14 Tage vor Reisebeginn.",
        ),
        generalization(
            "Wir senden, wie schon bei Ihrer Reisebuchung schriftlich mitgeteilt, 7-10 Tage vor Reiseantritt den Fahrausweis und Hotel -Voucher.",
            "Fahrausweis und Hotel-Voucher werden 7–10 Tage vor Reiseantritt versandt (nach vollständigem Zahlungseingang).",
        ),
        generalization(
            "Diesem entnehmen Sie dann bitte alle weiteren Details Ihrer Busreise wie Abholzeit und Haltestelle.",
            "Abholzeit und Haltestelle stehen im Fahrausweis.",
        ),
        generalization(
            "Voraussetzung ist der pünktliche Zahlungseingang der Restzahlung.",
            "Voraussetzung für den Versand der Reiseunterlagen ist der pünktliche Zahlungseingang der Restzahlung.",
        ),
        generalization(
            "Mit Verrechnungsschecks können wir leider seit Jahren nicht mehr dienen.",
            "Rückerstattungen erfolgen auf ein Bankkonto (IBAN); Verrechnungsschecks werden nicht angeboten.",
        ),
    ]
}
