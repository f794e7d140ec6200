// Classifier trait, the swap-ready abstraction for text labelling.
//
// One instance labels sentiment, another labels topic. Classification is
// local and cheap, so unlike the remote client this is a plain sync trait.

/// Maps a post's text to a single label.
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> String;
}

/// Always answers with the same label. Used when no model is configured for
/// a phase that never reads the label (and in tests).
pub struct FixedClassifier {
    label: String,
}

impl FixedClassifier {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Classifier for FixedClassifier {
    fn classify(&self, _text: &str) -> String {
        self.label.clone()
    }
}
