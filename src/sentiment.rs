//! Lexicon and rule based sentiment scoring.
//!
//! A VADER-style analyzer tuned for app and product complaints. Each token
//! is looked up in a valence lexicon (roughly −4..=4), then adjusted by the
//! usual heuristics:
//!
//! - booster and dampener words within the three preceding tokens,
//! - negation within the three preceding tokens (flips and damps),
//! - ALL-CAPS emphasis when the text is otherwise mixed case,
//! - "but" shifting weight onto the clause that follows it,
//! - exclamation and question mark emphasis.
//!
//! The summed valence is normalised into a compound score in `[-1, 1]`.

use serde::Serialize;
use std::collections::HashMap;

const NEGATION_SCALAR: f64 = -0.74;
const BOOSTER_INCR: f64 = 0.293;
const CAPS_INCR: f64 = 0.733;
const EXCLAMATION_INCR: f64 = 0.292;
const NORMALIZATION_ALPHA: f64 = 15.0;

/// Phrases that mark a complaint as a feature request or an app idea.
const REQUEST_PHRASES: &[&str] = &[
    "i wish",
    "would be great",
    "should have",
    "needs to",
    "if only",
    "please add",
    "can you add",
    "hope they add",
    "is there an app",
    "can someone make",
    "why isn't there",
    "why isn\u{2019}t there",
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "nothing", "nowhere", "neither", "nor", "cannot", "cant",
    "can't", "dont", "don't", "doesnt", "doesn't", "didnt", "didn't", "isnt", "isn't", "wasnt",
    "wasn't", "arent", "aren't", "wont", "won't", "wouldnt", "wouldn't", "shouldnt",
    "shouldn't", "couldnt", "couldn't", "aint", "ain't", "without", "hardly", "rarely",
    "seldom",
];

const BOOSTERS: &[(&str, f64)] = &[
    ("absolutely", BOOSTER_INCR),
    ("completely", BOOSTER_INCR),
    ("extremely", BOOSTER_INCR),
    ("incredibly", BOOSTER_INCR),
    ("really", BOOSTER_INCR),
    ("so", BOOSTER_INCR),
    ("too", BOOSTER_INCR),
    ("totally", BOOSTER_INCR),
    ("very", BOOSTER_INCR),
    ("utterly", BOOSTER_INCR),
    ("constantly", BOOSTER_INCR),
    ("super", BOOSTER_INCR),
    ("most", BOOSTER_INCR),
    ("highly", BOOSTER_INCR),
    ("seriously", BOOSTER_INCR),
    ("barely", -BOOSTER_INCR),
    ("slightly", -BOOSTER_INCR),
    ("somewhat", -BOOSTER_INCR),
    ("kinda", -BOOSTER_INCR),
    ("sorta", -BOOSTER_INCR),
    ("marginally", -BOOSTER_INCR),
    ("occasionally", -BOOSTER_INCR),
    ("partly", -BOOSTER_INCR),
    ("little", -BOOSTER_INCR),
];

const LEXICON: &[(&str, f64)] = &[
    // negative
    ("abandoned", -1.9),
    ("annoyed", -1.6),
    ("annoying", -1.8),
    ("angry", -2.3),
    ("awful", -2.0),
    ("bad", -2.5),
    ("broken", -2.1),
    ("bug", -1.4),
    ("buggy", -1.8),
    ("bugs", -1.4),
    ("clunky", -1.4),
    ("complain", -1.5),
    ("complaint", -1.2),
    ("confusing", -1.3),
    ("crap", -1.6),
    ("crappy", -2.5),
    ("crash", -1.7),
    ("crashed", -1.7),
    ("crashes", -1.9),
    ("crashing", -1.9),
    ("delete", -0.5),
    ("deleted", -0.8),
    ("disappointed", -1.9),
    ("disappointing", -2.2),
    ("disgusting", -2.4),
    ("dislike", -1.6),
    ("error", -1.3),
    ("errors", -1.4),
    ("fail", -2.5),
    ("failed", -2.3),
    ("failing", -2.3),
    ("fails", -2.2),
    ("failure", -2.3),
    ("fake", -2.1),
    ("freezes", -1.6),
    ("frozen", -1.2),
    ("frustrated", -2.4),
    ("frustrating", -1.9),
    ("frustration", -2.1),
    ("garbage", -2.1),
    ("glitch", -1.4),
    ("glitchy", -1.6),
    ("hate", -2.7),
    ("hated", -3.2),
    ("hates", -1.9),
    ("horrible", -2.5),
    ("impossible", -1.6),
    ("inaccurate", -1.3),
    ("infuriating", -2.9),
    ("irritating", -2.0),
    ("lag", -1.1),
    ("laggy", -1.5),
    ("lost", -1.3),
    ("mess", -1.5),
    ("miserable", -2.2),
    ("missing", -1.2),
    ("nightmare", -2.8),
    ("pathetic", -2.4),
    ("pain", -2.3),
    ("poor", -2.1),
    ("pointless", -1.7),
    ("problem", -1.7),
    ("problems", -1.7),
    ("refund", -0.8),
    ("ridiculous", -1.5),
    ("rubbish", -1.9),
    ("sad", -2.1),
    ("scam", -2.9),
    ("shame", -2.1),
    ("slow", -1.2),
    ("spam", -1.5),
    ("stuck", -1.3),
    ("stupid", -2.4),
    ("sucks", -1.5),
    ("terrible", -2.1),
    ("trash", -1.9),
    ("ugly", -2.3),
    ("unable", -1.4),
    ("unacceptable", -2.0),
    ("unreliable", -1.8),
    ("unusable", -2.3),
    ("upset", -1.6),
    ("useless", -1.8),
    ("waste", -1.8),
    ("wasted", -2.2),
    ("worse", -2.1),
    ("worst", -3.1),
    ("wrong", -2.1),
    ("tired", -1.9),
    ("sick", -2.3),
    ("hell", -3.6),
    ("ads", -0.6),
    ("overpriced", -1.6),
    ("expensive", -0.9),
    ("greedy", -1.6),
    ("difficult", -1.5),
    ("hard", -0.4),
    ("struggle", -1.5),
    ("struggling", -1.6),
    ("worry", -1.9),
    ("ruined", -2.3),
    ("ruin", -2.2),
    ("kill", -3.7),
    ("damn", -1.7),
    ("joke", -0.6),
    ("lacks", -1.2),
    ("lacking", -1.3),
    // positive
    ("amazing", 2.8),
    ("awesome", 3.1),
    ("best", 3.2),
    ("better", 1.9),
    ("brilliant", 2.8),
    ("clean", 1.7),
    ("convenient", 1.7),
    ("cool", 1.3),
    ("easy", 1.9),
    ("enjoy", 2.2),
    ("excellent", 2.7),
    ("fantastic", 2.6),
    ("favorite", 2.0),
    ("fine", 0.8),
    ("fix", 0.9),
    ("fixed", 1.0),
    ("free", 1.1),
    ("fun", 2.3),
    ("good", 1.9),
    ("great", 3.1),
    ("happy", 2.7),
    ("help", 1.7),
    ("helpful", 1.8),
    ("like", 1.5),
    ("love", 3.2),
    ("loved", 2.9),
    ("loves", 2.7),
    ("nice", 1.8),
    ("perfect", 2.7),
    ("perfectly", 3.2),
    ("pleased", 1.9),
    ("recommend", 1.5),
    ("reliable", 1.9),
    ("simple", 1.0),
    ("smooth", 1.6),
    ("solid", 1.2),
    ("thanks", 1.9),
    ("useful", 1.9),
    ("well", 1.1),
    ("wonderful", 2.7),
    ("works", 0.9),
    ("wow", 2.8),
    ("yay", 2.4),
    ("glad", 2.0),
    ("beautiful", 2.9),
    ("intuitive", 1.8),
    ("fast", 1.2),
    ("hope", 1.9),
    ("wish", 1.7),
    ("please", 1.3),
];

/// Polarity breakdown for one text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SentimentScores {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub compound: f64,
}

pub struct SentimentAnalyzer {
    lexicon: HashMap<&'static str, f64>,
    boosters: HashMap<&'static str, f64>,
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self {
            lexicon: LEXICON.iter().copied().collect(),
            boosters: BOOSTERS.iter().copied().collect(),
        }
    }

    /// Compound score in `[-1, 1]`.
    pub fn compound(&self, text: &str) -> f64 {
        self.analyze(text).compound
    }

    pub fn analyze(&self, text: &str) -> SentimentScores {
        let raw_tokens: Vec<&str> = text.split_whitespace().collect();
        let tokens: Vec<String> = raw_tokens.iter().map(|t| strip_punctuation(t)).collect();
        let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let mixed_case = is_mixed_case(&tokens);

        let mut valences: Vec<f64> = Vec::with_capacity(tokens.len());
        for (i, word) in lowered.iter().enumerate() {
            if self.boosters.contains_key(word.as_str()) {
                valences.push(0.0);
                continue;
            }
            let Some(&base) = self.lexicon.get(word.as_str()) else {
                valences.push(0.0);
                continue;
            };

            let mut valence = base;
            if mixed_case && is_all_caps(&tokens[i]) {
                valence += CAPS_INCR * valence.signum();
            }

            for distance in 1..=3 {
                if i < distance {
                    break;
                }
                let prior = &lowered[i - distance];
                if let Some(&incr) = self.boosters.get(prior.as_str()) {
                    let mut scalar = incr * valence.signum();
                    if mixed_case && is_all_caps(&tokens[i - distance]) {
                        scalar += CAPS_INCR * valence.signum();
                    }
                    let damp = match distance {
                        1 => 1.0,
                        2 => 0.95,
                        _ => 0.9,
                    };
                    valence += scalar * damp;
                }
                if NEGATIONS.contains(&prior.as_str()) {
                    valence *= NEGATION_SCALAR;
                }
            }

            valences.push(valence);
        }

        apply_but_weighting(&lowered, &mut valences);

        let emphasis = punctuation_emphasis(text);
        let sum: f64 = valences.iter().sum();
        let compound = if sum == 0.0 {
            0.0
        } else {
            normalize(sum + emphasis * sum.signum())
        };

        let (positive, negative, neutral) = polarity_shares(&valences, emphasis);
        SentimentScores {
            positive,
            negative,
            neutral,
            compound,
        }
    }
}

/// True when `text` reads like a feature request or a call for a new app.
pub fn is_feature_request(text: &str) -> bool {
    let lower = text.to_lowercase();
    REQUEST_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

fn strip_punctuation(token: &str) -> String {
    let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '\u{2019}');
    trimmed.trim_matches(|c| c == '\'' || c == '\u{2019}').to_string()
}

fn is_all_caps(token: &str) -> bool {
    token.chars().any(|c| c.is_alphabetic()) && !token.chars().any(|c| c.is_lowercase())
}

fn is_mixed_case(tokens: &[String]) -> bool {
    let caps = tokens.iter().filter(|t| is_all_caps(t)).count();
    caps > 0 && caps < tokens.iter().filter(|t| !t.is_empty()).count()
}

fn apply_but_weighting(lowered: &[String], valences: &mut [f64]) {
    let Some(pivot) = lowered.iter().position(|w| w == "but") else {
        return;
    };
    for (i, v) in valences.iter_mut().enumerate() {
        if i < pivot {
            *v *= 0.5;
        } else if i > pivot {
            *v *= 1.5;
        }
    }
}

fn punctuation_emphasis(text: &str) -> f64 {
    let exclamations = text.matches('!').count().min(4) as f64;
    let questions = text.matches('?').count();
    let question_emphasis = match questions {
        0 | 1 => 0.0,
        2 | 3 => questions as f64 * 0.18,
        _ => 0.96,
    };
    exclamations * EXCLAMATION_INCR + question_emphasis
}

fn normalize(score: f64) -> f64 {
    (score / (score * score + NORMALIZATION_ALPHA).sqrt()).clamp(-1.0, 1.0)
}

fn polarity_shares(valences: &[f64], emphasis: f64) -> (f64, f64, f64) {
    let mut pos_sum = 0.0;
    let mut neg_sum = 0.0;
    let mut neu_count = 0.0;
    for &v in valences {
        if v > 0.0 {
            pos_sum += v + 1.0;
        } else if v < 0.0 {
            neg_sum += v - 1.0;
        } else {
            neu_count += 1.0;
        }
    }

    if pos_sum > neg_sum.abs() {
        pos_sum += emphasis;
    } else if pos_sum < neg_sum.abs() {
        neg_sum -= emphasis;
    }

    let total = pos_sum + neg_sum.abs() + neu_count;
    if total == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let round = |x: f64| (x * 1000.0).round() / 1000.0;
    (
        round(pos_sum / total),
        round(neg_sum.abs() / total),
        round(neu_count / total),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compound(text: &str) -> f64 {
        SentimentAnalyzer::new().compound(text)
    }

    #[test]
    fn clear_complaint_is_strongly_negative() {
        let score = compound("This app is terrible. It crashes constantly and I hate it.");
        assert!(score < -0.6, "score was {score}");
    }

    #[test]
    fn praise_is_positive() {
        let score = compound("I love this app, it is great and works perfectly");
        assert!(score > 0.6, "score was {score}");
    }

    #[test]
    fn neutral_text_scores_zero() {
        assert_eq!(compound("The update arrived on Tuesday morning"), 0.0);
        assert_eq!(compound(""), 0.0);
    }

    #[test]
    fn negation_flips_polarity() {
        assert!(compound("this is good") > 0.0);
        assert!(compound("this is not good") < 0.0);
    }

    #[test]
    fn boosters_and_caps_intensify() {
        let plain = compound("the sync is bad");
        let boosted = compound("the sync is really bad");
        let shouted = compound("the sync is BAD");
        assert!(boosted < plain);
        assert!(shouted < plain);
    }

    #[test]
    fn exclamations_intensify() {
        assert!(compound("the sync is bad!!!") < compound("the sync is bad"));
    }

    #[test]
    fn clause_after_but_dominates() {
        assert!(compound("the design is nice but it crashes and freezes all the time") < 0.0);
    }

    #[test]
    fn shares_sum_to_one() {
        let scores = SentimentAnalyzer::new().analyze("Great look but terrible battery life");
        let total = scores.positive + scores.negative + scores.neutral;
        assert!((total - 1.0).abs() < 0.01);
        assert!(scores.negative > scores.positive);
    }

    #[test]
    fn compound_stays_in_range() {
        let text = "worst worst worst hate hate terrible awful useless garbage scam!!!!";
        let score = compound(text);
        assert!((-1.0..=1.0).contains(&score));
        assert!(score < -0.95);
    }

    #[test]
    fn detects_feature_requests() {
        assert!(is_feature_request("I wish it synced with my calendar"));
        assert!(is_feature_request("Is there an app that tracks this?"));
        assert!(is_feature_request("Why isn\u{2019}t there a dark mode"));
        assert!(!is_feature_request("It crashes when I log in"));
    }
}
