use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Who the user said they are
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub location: String,
}

/// A place-lookup suggestion pending validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationCandidate {
    pub formatted_address: String,
    #[serde(default)]
    pub place_types: BTreeSet<String>,
}

impl LocationCandidate {
    pub fn new<I, S>(formatted_address: &str, place_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            formatted_address: formatted_address.to_string(),
            place_types: place_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a comma separated type list, as posted by the picker form
    pub fn from_form(formatted_address: &str, place_types: &str) -> Self {
        Self::new(
            formatted_address.trim(),
            place_types
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty()),
        )
    }
}

/// One row of a category's confidence table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub label: String,
    pub value: f64,
}

/// Prediction for a single demographic category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPrediction {
    pub predicted: String,
    /// Percentage, 0-100
    pub confidence: f64,
    pub confidences: Vec<Confidence>,
}

impl CategoryPrediction {
    /// Build from a `label -> score (0..1)` table as returned by the upstream API.
    /// Rows are ordered by descending score; the top row is the prediction.
    pub fn from_scores(scores: &BTreeMap<String, f64>) -> Option<Self> {
        let mut confidences: Vec<Confidence> = scores
            .iter()
            .map(|(label, score)| Confidence {
                label: label.clone(),
                value: round2(score * 100.0),
            })
            .collect();
        confidences.sort_by(|a, b| {
            b.value
                .partial_cmp(&a.value)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.label.cmp(&b.label))
        });

        let top = confidences.first()?.clone();
        Some(Self {
            predicted: top.label,
            confidence: top.value,
            confidences,
        })
    }

    /// `confidences` must contain the predicted label
    pub fn is_consistent(&self) -> bool {
        self.confidences.iter().any(|c| c.label == self.predicted)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Demographic prediction for a submitted photo
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race: Option<CategoryPrediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<CategoryPrediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<CategoryPrediction>,
}

impl ClassificationResult {
    pub fn get(&self, category: Category) -> Option<&CategoryPrediction> {
        match category {
            Category::Race => self.race.as_ref(),
            Category::Age => self.age.as_ref(),
            Category::Gender => self.gender.as_ref(),
        }
    }

    /// First category whose prediction is missing from its confidence table
    pub fn inconsistent_category(&self) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| self.get(*c).is_some_and(|p| !p.is_consistent()))
    }
}

/// Demographic category, also the results tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Race,
    Age,
    Gender,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Race, Category::Age, Category::Gender];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Race => "race",
            Category::Age => "age",
            Category::Gender => "gender",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "race" => Ok(Category::Race),
            "age" => Ok(Category::Age),
            "gender" => Ok(Category::Gender),
            other => Err(format!("unknown category: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_scores_orders_descending() {
        let mut scores = BTreeMap::new();
        scores.insert("male".to_string(), 0.28);
        scores.insert("female".to_string(), 0.72);

        let p = CategoryPrediction::from_scores(&scores).unwrap();
        assert_eq!(p.predicted, "female");
        assert_eq!(p.confidence, 72.0);
        assert_eq!(p.confidences[0].label, "female");
        assert_eq!(p.confidences[1].label, "male");
        assert!(p.is_consistent());
    }

    #[test]
    fn test_from_scores_empty() {
        assert!(CategoryPrediction::from_scores(&BTreeMap::new()).is_none());
    }

    #[test]
    fn test_inconsistent_category() {
        let result = ClassificationResult {
            age: Some(CategoryPrediction {
                predicted: "40-49".to_string(),
                confidence: 50.0,
                confidences: vec![Confidence { label: "20-29".to_string(), value: 50.0 }],
            }),
            ..Default::default()
        };
        assert_eq!(result.inconsistent_category(), Some(Category::Age));
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("Gender".parse::<Category>().unwrap(), Category::Gender);
        assert!("height".parse::<Category>().is_err());
        assert_eq!(Category::default(), Category::Race);
    }

    #[test]
    fn test_candidate_from_form() {
        let c = LocationCandidate::from_form(" 12 Elm St ", "street_address, premise,");
        assert_eq!(c.formatted_address, "12 Elm St");
        assert_eq!(c.place_types.len(), 2);
        assert!(c.place_types.contains("premise"));
    }
}
