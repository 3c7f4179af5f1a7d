//! Thread matcher — pairs support replies with the inquiries they answer.
//!
//! Outbound messages are visited in ascending Message-ID order. For each
//! reply, the first In-Reply-To/References id that names a known inbound
//! message decides the match. An inbound message is consumed by the first
//! reply that claims it; a later reply pointing at the same inquiry stays
//! unmatched.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::mailbox::Mailbox;
use crate::pipeline::types::{MatchOutcome, Pair};

/// Pair inbound and outbound mailboxes.
///
/// `support_domain` (lowercase) restricts pairing to replies whose `From`
/// contains it. Zero pairs is reported, not an error.
pub fn match_threads(
    inbox: &Mailbox,
    outbox: &Mailbox,
    support_domain: Option<&str>,
) -> MatchOutcome {
    let mut outcome = MatchOutcome {
        outbound_without_id: outbox.without_id.len(),
        inbound_without_id: inbox.without_id.clone(),
        ..MatchOutcome::default()
    };
    let mut consumed: HashSet<&str> = HashSet::new();

    for (out_id, reply) in &outbox.by_id {
        if let Some(domain) = support_domain
            && !reply.is_from_domain(domain)
        {
            outcome.outbound_excluded += 1;
            continue;
        }

        let candidate = reply
            .reference_ids
            .iter()
            .find_map(|id| inbox.by_id.get_key_value(id.as_str()));

        match candidate {
            Some((in_id, inquiry)) if !consumed.contains(in_id.as_str()) => {
                consumed.insert(in_id.as_str());
                outcome.pairs.push(Pair {
                    sequence: outcome.pairs.len() + 1,
                    inbound: inquiry.clone(),
                    outbound: reply.clone(),
                });
            }
            Some((in_id, _)) => {
                debug!(outbound = %out_id, inbound = %in_id, "Inquiry already answered, reply left unmatched");
                outcome.unmatched_outbound.push(reply.clone());
            }
            None => outcome.unmatched_outbound.push(reply.clone()),
        }
    }

    outcome.unmatched_inbound = inbox
        .by_id
        .iter()
        .filter(|(id, _)| !consumed.contains(id.as_str()))
        .map(|(_, msg)| msg.clone())
        .collect();

    if outcome.pairs.is_empty() {
        warn!(
            outbound = outbox.len(),
            excluded = outcome.outbound_excluded,
            "No request/reply pairs found; check mailboxes and support domain"
        );
    } else {
        info!(
            pairs = outcome.pairs.len(),
            unmatched_outbound = outcome.unmatched_outbound.len(),
            unmatched_inbound = outcome.unmatched_inbound.len(),
            "Threads matched"
        );
    }
    outcome
}
