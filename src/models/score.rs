use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteScore {
    pub route_id: String,
    pub score: f64,
}

/// Score map that remembers insertion order, so ties resolve by encounter order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scores {
    entries: Vec<RouteScore>,
}

impl Scores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later inserts for the same id overwrite the score but keep the original position.
    pub fn insert(&mut self, route_id: impl Into<String>, score: f64) {
        let route_id = route_id.into();
        match self.entries.iter_mut().find(|e| e.route_id == route_id) {
            Some(existing) => existing.score = score,
            None => self.entries.push(RouteScore { route_id, score }),
        }
    }

    pub fn get(&self, route_id: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.route_id == route_id)
            .map(|e| e.score)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteScore> {
        self.entries.iter()
    }

    /// Entries by descending score; equal scores keep encounter order.
    pub fn sorted_desc(&self) -> Vec<RouteScore> {
        let mut sorted = self.entries.clone();
        // sort_by is stable
        sorted.sort_by(|a, b| b.score.total_cmp(&a.score));
        sorted
    }

    /// 1-based rank of every scored route.
    pub fn rank_map(&self) -> HashMap<String, usize> {
        self.sorted_desc()
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| (entry.route_id, idx + 1))
            .collect()
    }
}

impl FromIterator<RouteScore> for Scores {
    fn from_iter<I: IntoIterator<Item = RouteScore>>(iter: I) -> Self {
        let mut scores = Scores::new();
        for entry in iter {
            scores.insert(entry.route_id, entry.score);
        }
        scores
    }
}
