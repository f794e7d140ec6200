// Text classification: sentiment and topic labels attached to each post at
// admission.
//
// The Classifier trait is the swap seam. LexiconClassifier is the bundled
// implementation, a term-count model loaded from a JSON file at startup.

pub mod lexicon;
pub mod traits;

/// Sentiment labels produced by the sentiment classifier.
pub const SENTIMENT_LABELS: [&str; 3] = ["pos", "neg", "neu"];

/// The closed set of topic labels.
pub const TOPIC_LABELS: [&str; 18] = [
    "Business_Finance",
    "Disaster_Accident",
    "Education",
    "Entertainment_Culture",
    "Environment",
    "Health_Medical_Pharma",
    "Hospitality_Recreation",
    "Human Interest",
    "Labor",
    "Law_Crime",
    "Other",
    "Politics",
    "Religion_Belief",
    "Social Issues",
    "Sports",
    "Technology_Internet",
    "War_Conflict",
    "Weather",
];
