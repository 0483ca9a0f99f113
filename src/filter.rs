//! Composable row filters
//!
//! A filter is a pure predicate over the shallow row container: it inspects
//! inline fields through the container's direct `get` and never decodes the
//! full row, so it is cheap enough to run on every index event. Fields stored
//! as sub-containers are invisible to filters.

use crate::document::MapRef;
use crate::value::Value;
use std::sync::Arc;

/// A predicate over the shallow row container
#[derive(Clone)]
pub struct Filter {
    pred: Arc<dyn Fn(&MapRef) -> bool + Send + Sync>,
}

impl Filter {
    fn new(pred: impl Fn(&MapRef) -> bool + Send + Sync + 'static) -> Self {
        Self {
            pred: Arc::new(pred),
        }
    }

    pub(crate) fn eval(&self, row: &MapRef) -> bool {
        (self.pred)(row)
    }
}

/// Matches every row
pub fn any() -> Filter {
    Filter::new(|_| true)
}

/// Matches rows whose inline field equals `value`
pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Filter {
    let field = field.into();
    let value = value.into();
    Filter::new(move |row| row.get(&field).as_ref() == Some(&value))
}

/// Inverts a filter
pub fn not(filter: Filter) -> Filter {
    Filter::new(move |row| !filter.eval(row))
}

/// Short-circuit conjunction
pub fn and(filters: impl IntoIterator<Item = Filter>) -> Filter {
    let filters: Vec<Filter> = filters.into_iter().collect();
    Filter::new(move |row| filters.iter().all(|f| f.eval(row)))
}

/// Short-circuit disjunction
pub fn or(filters: impl IntoIterator<Item = Filter>) -> Filter {
    let filters: Vec<Filter> = filters.into_iter().collect();
    Filter::new(move |row| filters.iter().any(|f| f.eval(row)))
}
