// ── Emotion: Pattern Tables ────────────────────────────────────────────────
//
// Ordered `(matcher, label, base intensity, weight)` tuples plus the
// intensity-modifier lexicon. Compiled once on first use.
//
// Table order matters: when two labels tie on score, the one whose first
// pattern appears earlier wins.

use crate::atoms::types::Emotion;
use log::warn;
use regex::Regex;
use std::sync::LazyLock;

pub(crate) struct EmotionPattern {
    pub regex: Regex,
    pub label: Emotion,
    pub intensity: f32,
    pub weight: f32,
}

pub(crate) struct IntensityModifier {
    pub regex: Regex,
    pub phrase: &'static str,
    pub multiplier: f32,
}

/// Scoring order of the labels (ties resolve to the earlier one).
pub(crate) const LABEL_ORDER: [Emotion; 6] = [
    Emotion::Happy,
    Emotion::Excited,
    Emotion::Curious,
    Emotion::Sad,
    Emotion::Frustrated,
    Emotion::Confused,
];

pub(crate) static EMOTION_PATTERNS: LazyLock<Vec<EmotionPattern>> = LazyLock::new(|| {
    let table: &[(&str, Emotion, f32, f32)] = &[
        // Happy
        (r"(?i)\b(happy|glad|joyful|delighted|pleased|cheerful)\b", Emotion::Happy, 1.0, 1.0),
        (r"(?i)\b(great|awesome|wonderful|fantastic|amazing|lovely)\b", Emotion::Happy, 0.8, 1.0),
        (r"(?i)\b(thanks|thank you|appreciate it)\b", Emotion::Happy, 0.6, 0.8),
        (r"(:\)|:-\)|:D|😊|😀|🙂)", Emotion::Happy, 0.7, 0.8),
        // Excited
        (r"(?i)\b(excited|thrilled|pumped|stoked|can't wait|cannot wait)\b", Emotion::Excited, 1.0, 1.0),
        (r"(?i)\b(wow|yay|woohoo|omg)\b", Emotion::Excited, 0.8, 0.9),
        (r"!{2,}", Emotion::Excited, 0.6, 0.8),
        // Curious
        (r"(?i)\b(curious|wondering|wonder|intrigued|interested)\b", Emotion::Curious, 0.9, 1.0),
        (r"(?i)\b(tell me more|explain|how does|what if)\b", Emotion::Curious, 0.6, 0.8),
        // Sad
        (r"(?i)\b(sad|unhappy|depressed|lonely|miserable|heartbroken)\b", Emotion::Sad, 1.0, 1.0),
        (r"(?i)\b(miss|missing|crying|cried|tears|grief)\b", Emotion::Sad, 0.7, 0.8),
        (r"(:\(|:-\(|😢|😞|😭)", Emotion::Sad, 0.7, 0.8),
        // Frustrated
        (r"(?i)\b(frustrated|frustrating|annoyed|annoying|angry|irritated|fed up)\b", Emotion::Frustrated, 1.0, 1.0),
        (r"(?i)\b(doesn't work|does not work|not working|broken|useless)\b", Emotion::Frustrated, 0.8, 0.9),
        (r"(?i)\b(ugh|argh)\b", Emotion::Frustrated, 0.7, 0.8),
        // Confused
        (r"(?i)\b(confused|confusing|puzzled|unclear|lost)\b", Emotion::Confused, 1.0, 1.0),
        (r"(?i)\b(don't understand|do not understand|makes no sense|what do you mean)\b", Emotion::Confused, 0.9, 1.0),
        (r"\?{2,}", Emotion::Confused, 0.5, 0.7),
    ];

    table
        .iter()
        .filter_map(|&(pattern, label, intensity, weight)| match Regex::new(pattern) {
            Ok(regex) => Some(EmotionPattern {
                regex,
                label,
                intensity,
                weight,
            }),
            Err(e) => {
                warn!("[emotion] Failed to compile pattern '{}': {}", pattern, e);
                None
            }
        })
        .collect()
});

pub(crate) static INTENSITY_MODIFIERS: LazyLock<Vec<IntensityModifier>> = LazyLock::new(|| {
    let table: &[(&str, &'static str, f32)] = &[
        (r"(?i)\bextremely\b", "extremely", 1.8),
        (r"(?i)\bvery\b", "very", 1.5),
        (r"(?i)\breally\b", "really", 1.3),
        (r"(?i)\bso\b", "so", 1.2),
        (r"(?i)\bsomewhat\b", "somewhat", 0.8),
        (r"(?i)\ba bit\b", "a bit", 0.7),
        (r"(?i)\ba little\b", "a little", 0.7),
        (r"(?i)\bslightly\b", "slightly", 0.6),
    ];

    table
        .iter()
        .filter_map(|&(pattern, phrase, multiplier)| match Regex::new(pattern) {
            Ok(regex) => Some(IntensityModifier {
                regex,
                phrase,
                multiplier,
            }),
            Err(e) => {
                warn!("[emotion] Failed to compile modifier '{}': {}", pattern, e);
                None
            }
        })
        .collect()
});
