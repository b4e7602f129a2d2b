//! Composes the essay-matching WHERE clause for search from a fixed set of
//! predicates. User text only ever travels as a bound parameter.

use rusqlite::types::Value;

/// One matching rule against the `essays e` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Case-insensitive (Unicode) substring of the essay title.
    TitleContains(String),
    /// Case-sensitive substring of the raw essay number text.
    NumberContains(String),
}

impl Predicate {
    fn sql(&self) -> &'static str {
        // instr() rather than LIKE so '%' and '_' in user text stay literal
        match self {
            Self::TitleContains(_) => "instr(casefold(e.title), casefold(?)) > 0",
            Self::NumberContains(_) => "instr(e.essay_number, ?) > 0",
        }
    }

    fn param(&self) -> &str {
        match self {
            Self::TitleContains(s) | Self::NumberContains(s) => s,
        }
    }
}

/// Predicates joined with OR. An empty filter matches nothing.
#[derive(Debug, Default, Clone)]
pub struct EssayFilter {
    predicates: Vec<Predicate>,
}

impl EssayFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn or(mut self, p: Predicate) -> Self {
        self.predicates.push(p);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// The parenthesised condition, e.g. `(a OR b)`.
    pub fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            return "(0)".to_string();
        }
        let parts: Vec<&str> = self.predicates.iter().map(Predicate::sql).collect();
        format!("({})", parts.join(" OR "))
    }

    /// Positional parameters in clause order.
    pub fn params(&self) -> Vec<Value> {
        self.predicates
            .iter()
            .map(|p| Value::Text(p.param().to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_matches_nothing() {
        let f = EssayFilter::new();
        assert!(f.is_empty());
        assert_eq!(f.where_clause(), "(0)");
        assert!(f.params().is_empty());
    }

    #[test]
    fn test_or_composition_keeps_param_order() {
        let f = EssayFilter::new()
            .or(Predicate::TitleContains("light".into()))
            .or(Predicate::NumberContains("34".into()));
        assert_eq!(
            f.where_clause(),
            "(instr(casefold(e.title), casefold(?)) > 0 OR instr(e.essay_number, ?) > 0)"
        );
        assert_eq!(
            f.params(),
            vec![Value::Text("light".into()), Value::Text("34".into())]
        );
    }

    #[test]
    fn test_user_text_never_reaches_sql() {
        let f = EssayFilter::new().or(Predicate::TitleContains("'); DROP TABLE essays; --".into()));
        assert!(!f.where_clause().contains("DROP"));
    }
}
