// ── Conversation Flow Heuristics ───────────────────────────────────────────
//
// Cheap, deterministic signals over the recent message window:
//   "hi there"                       → greeting phase, low momentum
//   long user turns, few questions   → high depth, high clarity
//   many "??" turns                  → clarity drops (floored)
//
// This module:
//   - Maps the session's lifetime message count onto a `ConversationPhase`
//   - Computes momentum / depth / engagement / clarity for the Immediate layer
//   - Extracts active topics from a fixed keyword lexicon

use crate::atoms::constants::*;
use crate::atoms::types::{ConversationFlow, ConversationPhase, Message, Sender};

// ═══════════════════════════════════════════════════════════════════════════
// Topic lexicon
// ═══════════════════════════════════════════════════════════════════════════

const TOPIC_LEXICON: &[(&str, &[&str])] = &[
    ("work", &["work", "job", "office", "boss", "career", "meeting", "project", "deadline"]),
    ("family", &["family", "mom", "dad", "mother", "father", "sister", "brother", "kids", "parents"]),
    ("health", &["health", "doctor", "sick", "exercise", "sleep", "gym", "diet"]),
    ("music", &["music", "song", "songs", "album", "concert", "band", "jazz", "guitar"]),
    ("travel", &["travel", "trip", "flight", "vacation", "hotel", "beach", "japan"]),
    ("food", &["food", "cook", "cooking", "recipe", "dinner", "lunch", "restaurant", "pizza"]),
    ("technology", &["code", "coding", "programming", "computer", "software", "app", "rust"]),
    ("relationships", &["friend", "friends", "partner", "girlfriend", "boyfriend", "wedding"]),
    ("learning", &["learn", "learning", "study", "school", "class", "course", "book", "reading"]),
    ("feelings", &["feel", "feeling", "mood", "stress", "stressed", "anxious", "worried"]),
    ("hobbies", &["hobby", "game", "games", "movie", "film", "painting", "hiking"]),
    ("weather", &["weather", "rain", "sunny", "snow", "storm"]),
];

// ═══════════════════════════════════════════════════════════════════════════
// Phase & flow
// ═══════════════════════════════════════════════════════════════════════════

/// Step function of the session's total message count.
pub fn phase_for(total_messages: usize) -> ConversationPhase {
    if total_messages < PHASE_GREETING_MAX {
        ConversationPhase::Greeting
    } else if total_messages < PHASE_EXPLORATION_MAX {
        ConversationPhase::Exploration
    } else if total_messages < PHASE_DEEP_DISCUSSION_MAX {
        ConversationPhase::DeepDiscussion
    } else {
        ConversationPhase::Conclusion
    }
}

/// Flow metrics over the last `FLOW_WINDOW` messages.
pub fn analyze_flow(recent: &[Message], total_messages: usize) -> ConversationFlow {
    let window = &recent[recent.len().saturating_sub(FLOW_WINDOW)..];
    let phase = phase_for(total_messages);
    if window.is_empty() {
        return ConversationFlow {
            phase,
            ..ConversationFlow::default()
        };
    }

    let n = window.len() as f32;
    let avg_len = window
        .iter()
        .map(|m| m.content.chars().count())
        .sum::<usize>() as f32
        / n;
    let from_user = window.iter().filter(|m| m.sender == Sender::User).count() as f32;
    let questions = window.iter().filter(|m| m.content.contains('?')).count() as f32;

    ConversationFlow {
        phase,
        momentum: (avg_len / MOMENTUM_SCALE_CHARS).clamp(0.0, 1.0),
        depth: (avg_len / DEPTH_SCALE_CHARS).clamp(0.0, 1.0),
        engagement: from_user / n,
        clarity: (1.0 - questions / n).max(MIN_CLARITY),
    }
}

/// Lexicon topics mentioned in the messages, most-mentioned first.
pub fn active_topics(recent: &[Message]) -> Vec<String> {
    let mut hits = [0usize; TOPIC_LEXICON.len()];
    for message in recent {
        let lower = message.content.to_lowercase();
        for word in lower.split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            for (i, (_, terms)) in TOPIC_LEXICON.iter().enumerate() {
                if terms.contains(&word) {
                    hits[i] += 1;
                }
            }
        }
    }

    let mut ranked: Vec<(usize, usize)> = hits
        .iter()
        .enumerate()
        .filter(|(_, h)| **h > 0)
        .map(|(i, h)| (i, *h))
        .collect();
    // stable sort: ties keep lexicon order
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(MAX_ACTIVE_TOPICS)
        .map(|(i, _)| TOPIC_LEXICON[i].0.to_string())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_thresholds() {
        assert_eq!(phase_for(0), ConversationPhase::Greeting);
        assert_eq!(phase_for(2), ConversationPhase::Greeting);
        assert_eq!(phase_for(3), ConversationPhase::Exploration);
        assert_eq!(phase_for(9), ConversationPhase::Exploration);
        assert_eq!(phase_for(10), ConversationPhase::DeepDiscussion);
        assert_eq!(phase_for(29), ConversationPhase::DeepDiscussion);
        assert_eq!(phase_for(30), ConversationPhase::Conclusion);
    }

    #[test]
    fn test_empty_window_defaults() {
        let flow = analyze_flow(&[], 0);
        assert_eq!(flow.engagement, 0.5);
        assert_eq!(flow.clarity, 1.0);
        assert_eq!(flow.momentum, 0.0);
    }

    #[test]
    fn test_flow_metrics() {
        let msgs = vec![
            Message::user("x".repeat(100)),
            Message::assistant("y".repeat(300)),
            Message::user("what?"),
            Message::user("why?"),
        ];
        let flow = analyze_flow(&msgs, 4);
        // avg length = (100 + 300 + 5 + 4) / 4 = 102.25
        assert!((flow.momentum - 102.25 / 200.0).abs() < 1e-5);
        assert!((flow.depth - 102.25 / 500.0).abs() < 1e-5);
        assert_eq!(flow.engagement, 0.75);
        assert_eq!(flow.clarity, 0.5);
        assert_eq!(flow.phase, ConversationPhase::Exploration);
    }

    #[test]
    fn test_clarity_floor() {
        let msgs: Vec<Message> = (0..4).map(|_| Message::user("huh?")).collect();
        assert_eq!(analyze_flow(&msgs, 4).clarity, MIN_CLARITY);
    }

    #[test]
    fn test_window_only_sees_last_messages() {
        let mut msgs: Vec<Message> = (0..20).map(|_| Message::assistant("ok")).collect();
        msgs.extend((0..FLOW_WINDOW).map(|_| Message::user("ok")));
        assert_eq!(analyze_flow(&msgs, 30).engagement, 1.0);
    }

    #[test]
    fn test_active_topics_ranked_by_hits() {
        let msgs = vec![
            Message::user("My boss moved the project deadline"),
            Message::user("I need a vacation, maybe a trip to Japan"),
            Message::user("Anyway, the weather is nice"),
        ];
        let topics = active_topics(&msgs);
        assert_eq!(topics, vec!["work", "travel", "weather"]);
        assert!(active_topics(&[Message::user("hello")]).is_empty());
    }
}
