//! Results Presentation - demographics tabs
//!
//! Reads the stored classification and exposes one tab per category. A
//! category the API left out is shown with a placeholder prediction; that is
//! a display fallback only, the stored result is never touched.

use thiserror::Error;

use crate::session::Session;
use crate::types::{Category, CategoryPrediction, ClassificationResult, Confidence};

/// Nothing to present, send the user back to the start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no classification result stored")]
pub struct MissingResult;

/// Where the user goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Flow entry point
    Entry,
    /// Previous view, stored result untouched
    Previous,
    /// Next stage of the analysis
    Next,
}

/// One row of the confidence table
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceRow {
    pub label: String,
    pub value: f64,
    pub is_predicted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultsView {
    race: CategoryPrediction,
    age: CategoryPrediction,
    gender: CategoryPrediction,
    selected: Category,
}

impl ResultsView {
    pub fn load(session: &Session) -> Result<Self, MissingResult> {
        session
            .classification()
            .map(Self::from_result)
            .ok_or(MissingResult)
    }

    pub fn from_result(result: ClassificationResult) -> Self {
        Self {
            race: result.race.unwrap_or_else(|| placeholder(Category::Race)),
            age: result.age.unwrap_or_else(|| placeholder(Category::Age)),
            gender: result.gender.unwrap_or_else(|| placeholder(Category::Gender)),
            selected: Category::default(),
        }
    }

    pub fn selected(&self) -> Category {
        self.selected
    }

    pub fn select_tab(&mut self, category: Category) {
        self.selected = category;
    }

    /// Back to the first tab
    pub fn reset(&mut self) {
        self.selected = Category::Race;
    }

    pub fn prediction(&self, category: Category) -> &CategoryPrediction {
        match category {
            Category::Race => &self.race,
            Category::Age => &self.age,
            Category::Gender => &self.gender,
        }
    }

    pub fn selected_prediction(&self) -> &CategoryPrediction {
        self.prediction(self.selected)
    }

    /// Confidences of the selected tab, in stored order
    pub fn rows(&self) -> Vec<ConfidenceRow> {
        let prediction = self.selected_prediction();
        prediction
            .confidences
            .iter()
            .map(|c| ConfidenceRow {
                label: c.label.clone(),
                value: c.value,
                is_predicted: c.label == prediction.predicted,
            })
            .collect()
    }

    pub fn back(&self) -> Navigation {
        Navigation::Previous
    }

    pub fn confirm(&self) -> Navigation {
        Navigation::Next
    }
}

/// Shown when the API omitted a category
pub fn placeholder(category: Category) -> CategoryPrediction {
    let rows: &[(&str, f64)] = match category {
        Category::Race => &[
            ("Black", 99.51),
            ("Southeast Asian", 0.36),
            ("Latino Hispanic", 0.07),
            ("South Asian", 0.04),
            ("East Asian", 0.02),
            ("Middle Eastern", 0.0),
            ("White", 0.0),
        ],
        Category::Age => &[("20-29", 49.0), ("30-39", 30.0)],
        Category::Gender => &[("Female", 72.0), ("Male", 28.0)],
    };

    let (predicted, confidence) = rows[0];
    CategoryPrediction {
        predicted: predicted.to_string(),
        confidence,
        confidences: rows
            .iter()
            .map(|(label, value)| Confidence {
                label: label.to_string(),
                value: *value,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(session: &Session) -> ClassificationResult {
        let result = ClassificationResult {
            age: Some(CategoryPrediction {
                predicted: "30-39".to_string(),
                confidence: 55.0,
                confidences: vec![
                    Confidence { label: "20-29".to_string(), value: 40.0 },
                    Confidence { label: "30-39".to_string(), value: 55.0 },
                    Confidence { label: "40-49".to_string(), value: 5.0 },
                ],
            }),
            ..Default::default()
        };
        session.set_classification(&result).unwrap();
        result
    }

    #[test]
    fn test_missing_result() {
        let session = Session::in_memory();
        assert_eq!(ResultsView::load(&session), Err(MissingResult));
    }

    #[test]
    fn test_defaults_missing_categories() {
        let session = Session::in_memory();
        stored(&session);
        let view = ResultsView::load(&session).unwrap();

        assert_eq!(view.prediction(Category::Race).predicted, "Black");
        assert_eq!(view.prediction(Category::Gender).predicted, "Female");
        assert_eq!(view.prediction(Category::Age).predicted, "30-39");
    }

    #[test]
    fn test_rows_mark_prediction() {
        let session = Session::in_memory();
        stored(&session);
        let mut view = ResultsView::load(&session).unwrap();
        view.select_tab(Category::Age);

        let rows = view.rows();
        let labels: Vec<_> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["20-29", "30-39", "40-49"]);
        assert_eq!(rows.iter().filter(|r| r.is_predicted).count(), 1);
        assert!(rows[1].is_predicted);
    }

    #[test]
    fn test_load_is_idempotent() {
        let session = Session::in_memory();
        let original = stored(&session);

        let first = ResultsView::load(&session).unwrap();
        let second = ResultsView::load(&session).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.selected(), Category::Race);
        assert_eq!(first.rows(), second.rows());
        // Presenting never rewrites the stored result
        assert_eq!(session.classification(), Some(original));
    }

    #[test]
    fn test_reset_and_navigation() {
        let session = Session::in_memory();
        stored(&session);
        let mut view = ResultsView::load(&session).unwrap();

        view.select_tab(Category::Gender);
        assert_eq!(view.selected(), Category::Gender);
        view.reset();
        assert_eq!(view.selected(), Category::Race);

        assert_eq!(view.back(), Navigation::Previous);
        assert_eq!(view.confirm(), Navigation::Next);
        assert!(session.has_classification());
    }

    #[test]
    fn test_placeholders_are_consistent() {
        for category in Category::ALL {
            assert!(placeholder(category).is_consistent());
        }
    }
}
