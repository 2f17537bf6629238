// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use thiserror::Error;

use crate::{query::QueryContent, state::State};

pub type Generator = fn(&mut dyn State) -> QueryContent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("{0} has zero weight")]
    ZeroWeight(String),

    #[error("{0} is already registered")]
    DuplicateMethod(String),

    #[error("{0} is not supported")]
    UnsupportedMethod(String),

    #[error("total weight overflows at {0}")]
    WeightOverflow(String),

    #[error("no query generators available")]
    EmptyTable,
}

#[derive(Clone, Copy)]
pub struct RandomQuery {
    pub method: &'static str,
    pub weight: u64,
    pub generate: Generator,
}

impl std::fmt::Debug for RandomQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomQuery")
            .field("method", &self.method)
            .field("weight", &self.weight)
            .finish()
    }
}

/// Collects weighted queries. Registration is single-threaded and must finish
/// before [`QuerySelectorBuilder::build`].
#[derive(Debug, Default)]
pub struct QuerySelectorBuilder {
    queries: Vec<RandomQuery>,
    total_weight: u64,
}

impl QuerySelectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, query: RandomQuery) -> Result<(), SelectorError> {
        if query.weight == 0 {
            return Err(SelectorError::ZeroWeight(query.method.to_owned()));
        }
        if self.queries.iter().any(|q| q.method == query.method) {
            return Err(SelectorError::DuplicateMethod(query.method.to_owned()));
        }
        self.total_weight = self
            .total_weight
            .checked_add(query.weight)
            .ok_or_else(|| SelectorError::WeightOverflow(query.method.to_owned()))?;
        self.queries.push(query);
        Ok(())
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn build(mut self) -> QuerySelector {
        // heaviest first; stable sort keeps registration order between equals
        self.queries.sort_by(|a, b| b.weight.cmp(&a.weight));
        let cumulative = self
            .queries
            .iter()
            .scan(0u64, |acc, q| {
                *acc += q.weight;
                Some(*acc)
            })
            .collect();

        QuerySelector {
            queries: self.queries,
            cumulative,
            total_weight: self.total_weight,
        }
    }
}

/// Picks one registered query per call with probability `weight / total`.
///
/// The draw `w` is taken uniformly from `[0, total_weight)`. Entry `i` owns
/// the half-open range `[c(i-1), c(i))` of the cumulative weights, so a draw
/// that lands exactly on a running sum belongs to the *next* entry.
#[derive(Debug)]
pub struct QuerySelector {
    queries: Vec<RandomQuery>,
    cumulative: Vec<u64>,
    total_weight: u64,
}

impl QuerySelector {
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn queries(&self) -> &[RandomQuery] {
        &self.queries
    }

    /// Entry owning `draw`. Callers keep `draw < total_weight`.
    pub fn pick(&self, draw: u64) -> &RandomQuery {
        let idx = self.cumulative.partition_point(|&c| c <= draw);
        // out of range only if cumulative weights disagree with total_weight
        &self.queries[idx]
    }

    pub fn select(&self, state: &mut dyn State) -> Result<QueryContent, SelectorError> {
        if self.total_weight == 0 {
            return Err(SelectorError::EmptyTable);
        }
        let draw = state.rand_u64() % self.total_weight;
        let query = self.pick(draw);
        Ok((query.generate)(state))
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, sync::Arc};

    use test_case::test_case;

    use super::{Generator, QuerySelector, QuerySelectorBuilder, RandomQuery, SelectorError};
    use crate::{
        id::IdGenerator,
        query::QueryContent,
        state::{LiveState, State},
        testutil::{activity, FixedState},
    };

    fn gen_a(s: &mut dyn State) -> QueryContent {
        QueryContent::new(s.id(), "a", [(); 0])
    }

    fn gen_b(s: &mut dyn State) -> QueryContent {
        QueryContent::new(s.id(), "b", [(); 0])
    }

    fn gen_c(s: &mut dyn State) -> QueryContent {
        QueryContent::new(s.id(), "c", [(); 0])
    }

    fn query(method: &'static str, weight: u64) -> RandomQuery {
        let generate: Generator = match method {
            "a" => gen_a,
            "b" => gen_b,
            _ => gen_c,
        };
        RandomQuery {
            method,
            weight,
            generate,
        }
    }

    fn abc() -> QuerySelector {
        let mut builder = QuerySelectorBuilder::new();
        builder.register(query("a", 1)).unwrap();
        builder.register(query("b", 3)).unwrap();
        builder.register(query("c", 6)).unwrap();
        builder.build()
    }

    #[test]
    fn total_weight_is_sum_of_weights() {
        let mut builder = QuerySelectorBuilder::new();
        builder.register(query("a", 5)).unwrap();
        builder.register(query("b", 7)).unwrap();
        assert_eq!(
            builder.register(query("c", 0)),
            Err(SelectorError::ZeroWeight("c".to_owned()))
        );
        assert_eq!(builder.total_weight(), 12);
        assert_eq!(builder.build().total_weight(), 12);
    }

    #[test]
    fn duplicate_method_rejected() {
        let mut builder = QuerySelectorBuilder::new();
        builder.register(query("a", 5)).unwrap();
        assert_eq!(
            builder.register(query("a", 2)),
            Err(SelectorError::DuplicateMethod("a".to_owned()))
        );
        assert_eq!(builder.total_weight(), 5);
    }

    #[test]
    fn weight_overflow_rejected() {
        let mut builder = QuerySelectorBuilder::new();
        builder.register(query("a", u64::MAX)).unwrap();
        assert!(matches!(
            builder.register(query("b", 1)),
            Err(SelectorError::WeightOverflow(_))
        ));
    }

    #[test]
    fn entries_sorted_heaviest_first() {
        let selector = abc();
        let methods = selector
            .queries()
            .iter()
            .map(|q| q.method)
            .collect::<Vec<_>>();
        assert_eq!(methods, vec!["c", "b", "a"]);
    }

    // order is c(6) b(3) a(1): c owns [0,6), b owns [6,9), a owns [9,10)
    #[test_case(0, "c"; "lower bound")]
    #[test_case(5, "c"; "last draw of first entry")]
    #[test_case(6, "b"; "running sum equal to draw goes to next entry")]
    #[test_case(8, "b"; "last draw of middle entry")]
    #[test_case(9, "a"; "upper bound")]
    fn pick_boundaries(draw: u64, expected: &str) {
        assert_eq!(abc().pick(draw).method, expected);
    }

    #[test]
    fn every_draw_in_range_selects_an_entry() {
        let selector = abc();
        for draw in 0..selector.total_weight() {
            selector.pick(draw);
        }
    }

    #[test]
    fn select_uses_draw_modulo_total() {
        let selector = abc();
        let mut state = FixedState::default();
        state.draw = 16; // 16 % 10 = 6
        assert_eq!(selector.select(&mut state).unwrap().method, "b");
        state.draw = u64::MAX; // u64::MAX % 10 = 5
        assert_eq!(selector.select(&mut state).unwrap().method, "c");
    }

    #[test]
    fn empty_table_errors() {
        let selector = QuerySelectorBuilder::new().build();
        let mut state = FixedState::default();
        for _ in 0..3 {
            assert_eq!(
                selector.select(&mut state).unwrap_err(),
                SelectorError::EmptyTable
            );
        }
    }

    #[test]
    fn distribution_matches_weights() {
        let selector = abc();
        let mut state = LiveState::from_activity(Arc::new(IdGenerator::new()), 99, activity(1, 1));
        let draws = 100_000;
        let mut counts = HashMap::new();
        for _ in 0..draws {
            let q = selector.select(&mut state).unwrap();
            *counts.entry(q.method).or_insert(0u64) += 1;
        }
        for (method, weight) in [("a", 1.0), ("b", 3.0), ("c", 6.0)] {
            let freq = counts[method] as f64 / draws as f64;
            let expected = weight / 10.0;
            assert!(
                (freq - expected).abs() < 0.01,
                "{method}: freq {freq} expected {expected}"
            );
        }
    }
}
