//! Top-2 quadrant selection.

use crate::domain::quadrant::{LeverageTable, Quadrant};
use crate::domain::scoring::QuadrantScore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopQuadrantPair {
    pub date: NaiveDate,
    pub primary: Quadrant,
    pub secondary: Quadrant,
    pub primary_score: f64,
    pub secondary_score: f64,
}

impl TopQuadrantPair {
    pub fn quadrants(&self) -> [Quadrant; 2] {
        [self.primary, self.secondary]
    }

    /// Total leverage budget of the two selected quadrants.
    pub fn leverage_budget(&self, leverage: &LeverageTable) -> f64 {
        leverage.multiplier(self.primary) + leverage.multiplier(self.secondary)
    }
}

/// Descending by score; equal scores fall back to `Quadrant::PRIORITY`.
pub fn rank_quadrants(scores: &[QuadrantScore]) -> Vec<&QuadrantScore> {
    let mut ranked: Vec<&QuadrantScore> = scores.iter().collect();
    ranked.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.quadrant.priority().cmp(&b.quadrant.priority()),
        other => other,
    });
    ranked
}

pub fn select_top_pair(scores: &[QuadrantScore]) -> Option<TopQuadrantPair> {
    let ranked = rank_quadrants(scores);
    let (first, second) = (ranked.first()?, ranked.get(1)?);
    Some(TopQuadrantPair {
        date: first.date,
        primary: first.quadrant,
        secondary: second.quadrant,
        primary_score: first.score,
        secondary_score: second.score,
    })
}
