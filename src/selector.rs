//! Read-side query over a form's primary index: an ordered traversal of the
//! tree followed by a thin post-traversal filter. Traversal direction and
//! filtering are independent, mirroring the left/right descent used by the
//! original query walker this is adapted from.

use std::cmp::Ordering;

use error::Result;
use index::Index;
use value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
	Asc,
	Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
	Gt,
	Lt,
	Eq,
	Neq,
}

/// A `gt`/`lt`/`eq`/`neq` test against a projected field.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
	pub key_structure: String,
	pub op: Cond,
	pub value: Value,
}

/// An equality test against a projected field; the common case of
/// [`Condition`] broken out separately, matching the original query shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
	pub key_structure: String,
	pub value: Value,
}

/// An inclusive `start..=end` bound on a projected field. Either bound may
/// be omitted to mean "unbounded in that direction".
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
	pub key_structure: String,
	pub start: Option<Value>,
	pub end: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
	pub sort: Sort,
	pub scopes: Vec<Scope>,
	pub matches: Vec<Match>,
	pub conditions: Vec<Condition>,
	pub skip: usize,
	pub limit: Option<usize>,
}

impl Default for Selector {
	fn default() -> Self {
		Selector {
			sort: Sort::Asc,
			scopes: Vec::new(),
			matches: Vec::new(),
			conditions: Vec::new(),
			skip: 0,
			limit: None,
		}
	}
}

/// One thing that survived a selector's filter pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedThing {
	pub original_key: String,
	pub value: Value,
}

/// Runs `selector` against `primary`'s tree, ascending or descending per
/// `selector.sort`, filtering every live thing, then applying skip/limit.
pub fn select(primary: &Index, selector: &Selector) -> Result<Vec<MatchedThing>> {
	let ascending = selector.sort == Sort::Asc;
	let matched: Vec<MatchedThing> = primary
		.things(ascending)
		.into_iter()
		.filter_map(|thing| {
			let value = thing.value.as_ref()?;
			if passes(value, selector) {
				Some(MatchedThing { original_key: thing.original_key.clone(), value: value.clone() })
			} else {
				None
			}
		})
		.collect();

	let skipped = matched.into_iter().skip(selector.skip);
	Ok(match selector.limit {
		Some(limit) => skipped.take(limit).collect(),
		None => skipped.collect(),
	})
}

fn passes(value: &Value, selector: &Selector) -> bool {
	for scope in &selector.scopes {
		let projected = match value.project(&scope.key_structure) {
			Some(p) => p,
			None => return false,
		};
		if let Some(ref start) = scope.start {
			if compare(projected, start) != Some(Ordering::Greater) && projected != start {
				return false;
			}
		}
		if let Some(ref end) = scope.end {
			if compare(projected, end) != Some(Ordering::Less) && projected != end {
				return false;
			}
		}
	}

	for m in &selector.matches {
		match value.project(&m.key_structure) {
			Some(projected) if projected == &m.value => {},
			_ => return false,
		}
	}

	for cond in &selector.conditions {
		let projected = match value.project(&cond.key_structure) {
			Some(p) => p,
			None => return false,
		};
		let ok = match cond.op {
			Cond::Gt => compare(projected, &cond.value) == Some(Ordering::Greater),
			Cond::Lt => compare(projected, &cond.value) == Some(Ordering::Less),
			Cond::Eq => projected == &cond.value,
			Cond::Neq => projected != &cond.value,
		};
		if !ok {
			return false;
		}
	}

	true
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
	match (a, b) {
		(&Value::Int(x), &Value::Int(y)) => x.partial_cmp(&y),
		(&Value::Float(x), &Value::Float(y)) => x.partial_cmp(&y),
		(&Value::Int(x), &Value::Float(y)) => (x as f64).partial_cmp(&y),
		(&Value::Float(x), &Value::Int(y)) => x.partial_cmp(&(y as f64)),
		(&Value::Str(ref x), &Value::Str(ref y)) => x.partial_cmp(y),
		_ => None,
	}
}
