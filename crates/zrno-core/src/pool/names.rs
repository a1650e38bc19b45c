//! Name handling: qualification, JSON names, and the scope-walking type
//! resolution rule.
//!
//! Resolution searches from the innermost scope outward, but only for the
//! *first* component of the name: once a scope containing the first
//! component is found, the remainder must resolve beneath it or the lookup
//! fails. Leading-dot names are absolute. This matches the reference
//! compiler's behavior, surprising cases included.

use std::collections::HashMap;

use super::Symbol;

/// Joins a scope and a simple name into a fully-qualified name.
pub(crate) fn join(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

/// Strips the last component off a fully-qualified name.
pub(crate) fn parent_scope(fqn: &str) -> &str {
    match fqn.rfind('.') {
        Some(dot) => &fqn[..dot],
        None => "",
    }
}

/// Computes the JSON name of a field: underscores removed, the following
/// letter capitalized.
pub(crate) fn to_json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut capitalize = false;
    for c in name.chars() {
        if c == '_' {
            capitalize = true;
        } else if capitalize {
            out.extend(c.to_uppercase());
            capitalize = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Resolves a type name written in a schema against the symbol table,
/// searching from `scope` outward. Returns the fully-qualified name of the
/// match.
pub(crate) fn resolve(
    symbols: &HashMap<String, Symbol>,
    scope: &str,
    name: &str,
) -> Option<String> {
    if let Some(absolute) = name.strip_prefix('.') {
        return symbols.contains_key(absolute).then(|| absolute.to_string());
    }

    let first = name.split('.').next().unwrap_or(name);
    let mut current = scope;
    loop {
        let candidate_first = join(current, first);
        if symbols.contains_key(&candidate_first) {
            // The first component anchors here; the full name must resolve
            // beneath this scope or not at all.
            let full = join(current, name);
            return symbols.contains_key(&full).then_some(full);
        }
        if current.is_empty() {
            return None;
        }
        current = parent_scope(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(names: &[&str]) -> HashMap<String, Symbol> {
        names
            .iter()
            .map(|name| (name.to_string(), Symbol::Package))
            .collect()
    }

    #[test]
    fn test_join_and_parent() {
        assert_eq!(join("", "Foo"), "Foo");
        assert_eq!(join("pkg", "Foo"), "pkg.Foo");
        assert_eq!(parent_scope("pkg.Foo.Bar"), "pkg.Foo");
        assert_eq!(parent_scope("Foo"), "");
    }

    #[test]
    fn test_json_name() {
        assert_eq!(to_json_name("foo_bar"), "fooBar");
        assert_eq!(to_json_name("foo"), "foo");
        assert_eq!(to_json_name("foo_bar_baz"), "fooBarBaz");
        assert_eq!(to_json_name("foo__bar"), "fooBar");
        assert_eq!(to_json_name("_foo"), "Foo");
    }

    #[test]
    fn test_absolute_resolution() {
        let table = symbols(&["pkg", "pkg.Msg"]);
        assert_eq!(
            resolve(&table, "other.Scope", ".pkg.Msg"),
            Some("pkg.Msg".to_string())
        );
        assert_eq!(resolve(&table, "", ".missing"), None);
    }

    #[test]
    fn test_innermost_scope_wins() {
        let table = symbols(&["pkg", "pkg.Msg", "pkg.Outer", "pkg.Outer.Msg"]);
        assert_eq!(
            resolve(&table, "pkg.Outer", "Msg"),
            Some("pkg.Outer.Msg".to_string())
        );
        assert_eq!(resolve(&table, "pkg", "Msg"), Some("pkg.Msg".to_string()));
    }

    #[test]
    fn test_first_component_anchors() {
        // `Outer.Msg` from inside pkg.Outer: the first component `Outer`
        // anchors at scope `pkg`, so the whole name must resolve there.
        let table = symbols(&["pkg", "pkg.Outer", "pkg.Outer.Msg"]);
        assert_eq!(
            resolve(&table, "pkg.Outer", "Outer.Msg"),
            Some("pkg.Outer.Msg".to_string())
        );

        // If the anchor exists but the remainder does not, resolution fails
        // rather than continuing outward.
        let table = symbols(&["pkg", "pkg.Outer", "Outer", "Outer.Elsewhere"]);
        assert_eq!(resolve(&table, "pkg.Inner", "Outer.Elsewhere"), None);
    }

    #[test]
    fn test_package_walk() {
        let table = symbols(&["a", "a.b", "a.b.Msg"]);
        assert_eq!(
            resolve(&table, "a.b.c.D", "Msg"),
            Some("a.b.Msg".to_string())
        );
    }
}
