//! History trimming — bounds the context sent to the model.
//!
//! The retained window is a suffix of the conversation that fits the
//! budget and starts on the boundary role, so the model never sees a
//! reply (or a tool result) without the turn that prompted it.
//!
//! The budget is a hard cap. When the newest fitting suffix would start
//! mid-exchange, the window start moves *forward* to the first
//! boundary-role message inside it, dropping the orphaned tail of the
//! older exchange.

use ripple_config::{HistoryConfig, TrimUnit};
use ripple_core::message::{Message, Role};
use tracing::{debug, warn};

use super::token::{MESSAGE_OVERHEAD, estimate_message_tokens, tail_within};

/// Trimming policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimConfig {
    pub max_units: usize,
    pub unit: TrimUnit,
    pub always_include_system: bool,
    pub boundary_role: Role,
    pub allow_partial: bool,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self::from(&HistoryConfig::default())
    }
}

impl From<&HistoryConfig> for TrimConfig {
    fn from(cfg: &HistoryConfig) -> Self {
        Self {
            max_units: cfg.max_units,
            unit: cfg.unit,
            always_include_system: cfg.always_include_system,
            boundary_role: cfg.boundary_role,
            allow_partial: cfg.allow_partial,
        }
    }
}

impl TrimConfig {
    /// Cost of one message under the configured unit.
    pub fn cost(&self, message: &Message) -> usize {
        match self.unit {
            TrimUnit::MessageCount => 1,
            TrimUnit::ApproxTokenCount => estimate_message_tokens(message),
        }
    }

    /// Total cost of a message sequence.
    pub fn total(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.cost(m)).sum()
    }
}

/// What a trim did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimReport {
    /// Messages left out of the window.
    pub dropped: usize,
    /// Units used by the returned window.
    pub units: usize,
    /// The oldest retained message had its content cut.
    pub partial: bool,
}

/// Trim `messages` to a suffix window under `config`. Never mutates input.
pub fn trim_messages(messages: &[Message], config: &TrimConfig) -> Vec<Message> {
    trim_with_report(messages, config).0
}

pub fn trim_with_report(messages: &[Message], config: &TrimConfig) -> (Vec<Message>, TrimReport) {
    if messages.is_empty() {
        return (Vec::new(), TrimReport::default());
    }

    let (system, rest) = match messages.split_first() {
        Some((first, rest)) if config.always_include_system && first.role == Role::System => {
            (Some(first), rest)
        }
        _ => (None, messages),
    };

    let mut budget = config.max_units;
    let mut out = Vec::new();
    if let Some(sys) = system {
        let cost = config.cost(sys);
        if cost <= budget {
            budget -= cost;
            out.push(sys.clone());
        } else {
            warn!(cost, budget, "System message alone exceeds history budget, dropping it");
        }
    }

    // Earliest index of the longest suffix of `rest` that fits.
    let mut start = rest.len();
    let mut used = 0;
    for (i, msg) in rest.iter().enumerate().rev() {
        let cost = config.cost(msg);
        if used + cost > budget {
            break;
        }
        used += cost;
        start = i;
    }

    let window_start = rest[start..]
        .iter()
        .position(|m| m.role == config.boundary_role)
        .map(|offset| start + offset);

    let mut partial = false;
    match window_start {
        Some(i) => out.extend_from_slice(&rest[i..]),
        None if !rest.iter().any(|m| m.role == config.boundary_role) => {
            // Nothing to align on; keep the budget-capped suffix.
            out.extend_from_slice(&rest[start..]);
        }
        None => match partial_window(rest, budget, config) {
            Some(window) => {
                partial = true;
                out.extend(window);
            }
            None => warn!(
                budget = config.max_units,
                "No boundary-aligned window fits the history budget"
            ),
        },
    }

    let units = config.total(&out);
    let report = TrimReport {
        dropped: messages.len() - out.len(),
        units,
        partial,
    };
    if report.dropped > 0 {
        debug!(dropped = report.dropped, units, partial, "History trimmed");
    }
    (out, report)
}

/// Cut the newest boundary-role message down to its trailing content so it
/// and everything after it fit. Token budgets only.
fn partial_window(rest: &[Message], budget: usize, config: &TrimConfig) -> Option<Vec<Message>> {
    if !config.allow_partial || config.unit != TrimUnit::ApproxTokenCount {
        return None;
    }

    let anchor = rest.iter().rposition(|m| m.role == config.boundary_role)?;
    let tail = &rest[anchor + 1..];
    let available = budget.checked_sub(config.total(tail))?;
    let content_tokens = available.checked_sub(MESSAGE_OVERHEAD)?;

    let kept = tail_within(&rest[anchor].content, content_tokens);
    if kept.is_empty() {
        return None;
    }

    let mut cut = rest[anchor].clone();
    cut.content = kept.to_string();
    let mut window = vec![cut];
    window.extend_from_slice(tail);
    Some(window)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_config(max_units: usize) -> TrimConfig {
        TrimConfig {
            max_units,
            unit: TrimUnit::MessageCount,
            always_include_system: true,
            boundary_role: Role::User,
            allow_partial: true,
        }
    }

    fn token_config(max_units: usize) -> TrimConfig {
        TrimConfig {
            unit: TrimUnit::ApproxTokenCount,
            ..count_config(max_units)
        }
    }

    fn tool_msg(content: &str) -> Message {
        Message::tool_result("call", content)
    }

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(trim_messages(&[], &count_config(10)).is_empty());
    }

    #[test]
    fn short_history_unchanged() {
        let msgs = vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        let (out, report) = trim_with_report(&msgs, &count_config(10));
        assert_eq!(out, msgs);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.units, 3);
    }

    #[test]
    fn window_moves_forward_to_boundary() {
        let msgs = vec![
            Message::user("u1"),
            Message::assistant("a1"),
            tool_msg("t1"),
            Message::assistant("a1b"),
            Message::user("u2"),
            Message::assistant("a2"),
        ];
        // last 4 would start on the tool result
        let out = trim_messages(&msgs, &count_config(4));
        assert_eq!(contents(&out), vec!["u2", "a2"]);
        assert_eq!(out[0].role, Role::User);
    }

    #[test]
    fn system_is_kept_and_counted() {
        let msgs = vec![
            Message::system("sys"),
            Message::user("u1"),
            Message::assistant("a1"),
            Message::user("u2"),
            Message::assistant("a2"),
        ];
        let out = trim_messages(&msgs, &count_config(3));
        assert_eq!(contents(&out), vec!["sys", "u2", "a2"]);
    }

    #[test]
    fn system_not_special_when_disabled() {
        let msgs = vec![Message::system("sys"), Message::user("u1")];
        let config = TrimConfig {
            always_include_system: false,
            ..count_config(1)
        };
        assert_eq!(contents(&trim_messages(&msgs, &config)), vec!["u1"]);
    }

    #[test]
    fn no_boundary_role_keeps_capped_suffix() {
        let msgs = vec![
            Message::assistant("a1"),
            tool_msg("t1"),
            Message::assistant("a2"),
        ];
        assert_eq!(contents(&trim_messages(&msgs, &count_config(10))), vec!["a1", "t1", "a2"]);
        assert_eq!(contents(&trim_messages(&msgs, &count_config(2))), vec!["t1", "a2"]);
    }

    #[test]
    fn boundary_only_before_window_yields_empty() {
        let msgs = vec![
            Message::user("u1"),
            Message::assistant("a1"),
            tool_msg("t1"),
            Message::assistant("a2"),
        ];
        let out = trim_messages(&msgs, &count_config(2));
        assert!(out.is_empty());
    }

    #[test]
    fn input_not_mutated() {
        let msgs = vec![Message::user("u1"), Message::assistant("a1"), Message::user("u2")];
        let before = msgs.clone();
        let _ = trim_messages(&msgs, &count_config(1));
        assert_eq!(msgs, before);
    }

    #[test]
    fn token_budget_respected() {
        let msgs = vec![
            Message::user(&"a".repeat(40)),      // 14 tokens
            Message::assistant(&"b".repeat(40)), // 14 tokens
            Message::user(&"c".repeat(8)),       // 6 tokens
            Message::assistant(&"d".repeat(8)),  // 6 tokens
        ];
        let config = token_config(20);
        let (out, report) = trim_with_report(&msgs, &config);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "c".repeat(8));
        assert_eq!(report.units, 12);
        assert!(!report.partial);
    }

    #[test]
    fn oversized_newest_message_cut_when_partial_allowed() {
        let long = format!("{}{}", "x".repeat(400), "the actual question?");
        let msgs = vec![Message::user("old"), Message::assistant("reply"), Message::user(&long)];
        let config = token_config(10); // 4 overhead + 6 tokens = 24 chars

        let (out, report) = trim_with_report(&msgs, &config);
        assert!(report.partial);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, Role::User);
        assert!(long.ends_with(&out[0].content));
        assert!(out[0].content.ends_with("the actual question?"));
        assert!(report.units <= 10);
    }

    #[test]
    fn oversized_newest_message_dropped_without_partial() {
        let msgs = vec![Message::user(&"x".repeat(400))];
        let config = TrimConfig {
            allow_partial: false,
            ..token_config(10)
        };
        assert!(trim_messages(&msgs, &config).is_empty());
    }

    #[test]
    fn partial_has_no_effect_under_message_count() {
        let msgs = vec![Message::user("u"), Message::assistant("a"), tool_msg("t")];
        let out = trim_messages(&msgs, &count_config(2));
        assert!(out.is_empty());
    }

    #[test]
    fn output_within_budget_and_aligned_for_many_shapes() {
        let roles = [Role::User, Role::Assistant, Role::Tool, Role::Assistant];
        for len in 0..12 {
            let msgs: Vec<Message> = (0..len)
                .map(|i| Message::new(roles[i % roles.len()], "x".repeat(i * 3)))
                .collect();
            for max in 1..10 {
                for config in [count_config(max), token_config(max * 6)] {
                    let out = trim_messages(&msgs, &config);
                    assert!(config.total(&out) <= config.max_units);
                    if let Some(first) = out.first() {
                        let has_boundary = msgs.iter().any(|m| m.role == Role::User);
                        assert!(!has_boundary || first.role == Role::User);
                    }
                }
            }
        }
    }
}
