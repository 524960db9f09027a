//! Key expressions (spec.md §4.3): a small algebraic tree describing how to
//! extract one or more index-key tuples from a record, decoupled from any
//! particular `RecordAccess` implementation — evaluation is driven by a
//! plain field-name-to-elements extractor closure.

use recordlayer_tuple::{Element, Tuple};

/// Describes how to pull a tuple (or, for multi-valued fields, several
/// tuples) out of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyExpression {
    /// Evaluates to the elements extracted for the named field — one
    /// tuple per element if the field is multi-valued.
    Field(String),
    /// Cartesian product of the children's evaluations: if any child
    /// yields N tuples and others yield 1, the output is N tuples.
    Concat(Vec<KeyExpression>),
    /// Yields a single empty tuple.
    Empty,
}

impl KeyExpression {
    pub fn field(name: impl Into<String>) -> Self { KeyExpression::Field(name.into()) }

    pub fn concat(children: impl IntoIterator<Item = KeyExpression>) -> Self { KeyExpression::Concat(children.into_iter().collect()) }

    /// Static arity of every tuple this expression produces.
    pub fn column_count(&self) -> usize {
        match self {
            KeyExpression::Empty => 0,
            KeyExpression::Field(_) => 1,
            KeyExpression::Concat(children) => children.iter().map(KeyExpression::column_count).sum(),
        }
    }

    /// Evaluates this expression against a record, given a closure that
    /// extracts the tuple elements for a named field (multiple elements for
    /// a multi-valued field). All returned tuples share the same arity:
    /// `column_count()`.
    pub fn evaluate<F>(&self, extract: &F) -> Vec<Tuple>
    where F: Fn(&str) -> Vec<Element> {
        match self {
            KeyExpression::Empty => vec![Vec::new()],
            KeyExpression::Field(name) => extract(name).into_iter().map(|e| vec![e]).collect(),
            KeyExpression::Concat(children) => {
                children.iter().fold(vec![Vec::new()], |acc, child| {
                    let child_tuples = child.evaluate(extract);
                    let mut out = Vec::with_capacity(acc.len() * child_tuples.len());
                    for prefix in &acc {
                        for suffix in &child_tuples {
                            let mut combined = prefix.clone();
                            combined.extend(suffix.iter().cloned());
                            out.push(combined);
                        }
                    }
                    out
                })
            }
        }
    }

    /// The list of field names this expression is `Field`-grounded on, in
    /// evaluation order. `Permuted` index validation (spec.md §4.8) and
    /// covering-index `covers()` checks (spec.md §4.9) both need this flat
    /// view rather than the tree shape.
    pub fn field_names(&self) -> Vec<&str> {
        match self {
            KeyExpression::Empty => Vec::new(),
            KeyExpression::Field(name) => vec![name.as_str()],
            KeyExpression::Concat(children) => children.iter().flat_map(KeyExpression::field_names).collect(),
        }
    }

    /// True iff every direct child is a bare `Field` — the shape the
    /// Permuted maintainer requires (spec.md §9: "a `Concat` containing
    /// anything other than `Field` children MUST fail validation
    /// strictly").
    pub fn is_flat_concat_of_fields(&self) -> bool {
        match self {
            KeyExpression::Concat(children) => children.iter().all(|c| matches!(c, KeyExpression::Field(_))),
            KeyExpression::Field(_) => true,
            KeyExpression::Empty => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(record: &[(&str, Vec<Element>)]) -> impl Fn(&str) -> Vec<Element> + '_ {
        move |name| record.iter().find(|(n, _)| *n == name).map(|(_, v)| v.clone()).unwrap_or_default()
    }

    #[test]
    fn field_column_count_is_one() { assert_eq!(KeyExpression::field("x").column_count(), 1); }

    #[test]
    fn empty_yields_single_empty_tuple() {
        let expr = KeyExpression::Empty;
        let f = extractor(&[]);
        assert_eq!(expr.evaluate(&f), vec![Vec::<Element>::new()]);
        assert_eq!(expr.column_count(), 0);
    }

    #[test]
    fn concat_cartesian_product_for_multivalued_field() {
        let expr = KeyExpression::concat([KeyExpression::field("category"), KeyExpression::field("tag")]);
        let record = [
            ("category", vec![Element::from("Electronics")]),
            ("tag", vec![Element::from("swift"), Element::from("fdb"), Element::from("testing")]),
        ];
        let f = extractor(&record);
        let tuples = expr.evaluate(&f);
        assert_eq!(tuples.len(), 3);
        for t in &tuples {
            assert_eq!(t.len(), 2);
            assert_eq!(t[0], Element::from("Electronics"));
        }
        assert_eq!(expr.column_count(), 2);
    }

    #[test]
    fn field_names_flattened_in_order() {
        let expr = KeyExpression::concat([KeyExpression::field("region"), KeyExpression::field("amount")]);
        assert_eq!(expr.field_names(), vec!["region", "amount"]);
    }
}
