//! Cache-hint annotation for provider-side prompt caching.
//!
//! Two breakpoints are placed. The last message is marked so the whole
//! prompt prefix is cached for the next call in this run. The second-to-last
//! user turn is marked so the prefix shared with the previous run is reused.
//! User turns are counted from the end including the last message, so after
//! a tool round the previous turn is marked, not the current one.

use ripple_core::message::{Message, Role};

/// Return a copy of `messages` with at most two cache breakpoints set.
///
/// Existing breakpoints on the input are cleared in the copy, so repeated
/// annotation never accumulates more than two.
pub fn annotate(messages: &[Message]) -> Vec<Message> {
    let mut out: Vec<Message> = messages
        .iter()
        .map(|m| Message {
            cache_control: None,
            ..m.clone()
        })
        .collect();

    let Some(last) = out.len().checked_sub(1) else {
        return out;
    };

    out[last] = out[last].cached();

    let previous_turn = out
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, m)| m.role == Role::User)
        .nth(1)
        .map(|(i, _)| i);
    if let Some(i) = previous_turn {
        out[i] = out[i].cached();
    }

    out
}
