//! Declaration dependency analysis: transitive closures and the partition of
//! a declaration block into ordered recursion domains.
//!
//! A recursion domain is a strongly-connected component of the declaration
//! dependency graph. Domains are emitted in an order where every domain
//! precedes the domains depending on it; mutually recursive declarations
//! share one domain and see each other through the same environment
//! contract. The order is total and deterministic: ties are broken by the
//! position of each domain's first declaration in the source.

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::ir::Expr;

/// Direct dependencies of each declaration, restricted to the declaration
/// set itself.
pub fn declaration_dependencies(
    declarations: &IndexMap<String, Expr>,
) -> AHashMap<String, AHashSet<String>> {
    declarations
        .iter()
        .map(|(name, body)| {
            let deps = body
                .free_references()
                .into_iter()
                .filter(|reference| declarations.contains_key(reference))
                .collect();
            (name.clone(), deps)
        })
        .collect()
}

/// Transitive dependency closure per declaration, computed with an explicit
/// worklist. A declaration appears in its own closure exactly when it sits
/// on a dependency cycle.
pub fn transitive_closures(
    dependencies: &AHashMap<String, AHashSet<String>>,
) -> AHashMap<String, AHashSet<String>> {
    let mut closures: AHashMap<String, AHashSet<String>> = AHashMap::new();
    for name in dependencies.keys() {
        let mut closure = AHashSet::new();
        let mut worklist: Vec<&String> = dependencies[name].iter().collect();
        while let Some(next) = worklist.pop() {
            if closure.insert(next.clone()) {
                if let Some(more) = dependencies.get(next) {
                    worklist.extend(more.iter());
                }
            }
        }
        closures.insert(name.clone(), closure);
    }
    closures
}

/// The set of declarations reachable from the roots (the exposed set of a
/// module, or a let-block's body references), including the roots.
pub fn reachable_from<'a>(
    dependencies: &AHashMap<String, AHashSet<String>>,
    roots: impl IntoIterator<Item = &'a str>,
) -> AHashSet<String> {
    let mut reached = AHashSet::new();
    let mut worklist: Vec<String> = roots
        .into_iter()
        .filter(|root| dependencies.contains_key(*root))
        .map(str::to_owned)
        .collect();
    while let Some(next) = worklist.pop() {
        if reached.insert(next.clone()) {
            if let Some(more) = dependencies.get(&next) {
                worklist.extend(more.iter().cloned());
            }
        }
    }
    reached
}

/// Partitions declarations into recursion domains and orders them so that
/// dependencies come first. `order` fixes the tie-breaking source order.
pub fn recursion_domains(
    order: &[String],
    closures: &AHashMap<String, AHashSet<String>>,
) -> Vec<Vec<String>> {
    let position: AHashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(index, name)| (name.as_str(), index))
        .collect();

    // group mutually dependent declarations into one domain
    let mut assigned: AHashMap<String, usize> = AHashMap::new();
    let mut domains: Vec<Vec<String>> = Vec::new();
    for name in order {
        if assigned.contains_key(name.as_str()) {
            continue;
        }
        let mut members = vec![name.clone()];
        for candidate in order {
            if candidate == name || assigned.contains_key(candidate.as_str()) {
                continue;
            }
            let mutual = closures
                .get(name)
                .is_some_and(|closure| closure.contains(candidate))
                && closures
                    .get(candidate)
                    .is_some_and(|closure| closure.contains(name));
            if mutual {
                members.push(candidate.clone());
            }
        }
        let index = domains.len();
        for member in &members {
            assigned.insert(member.clone(), index);
        }
        domains.push(members);
    }

    // domain-level dependencies
    let mut domain_deps: Vec<AHashSet<usize>> = vec![AHashSet::new(); domains.len()];
    for (index, members) in domains.iter().enumerate() {
        for member in members {
            if let Some(closure) = closures.get(member) {
                for dependency in closure {
                    if let Some(&target) = assigned.get(dependency.as_str()) {
                        if target != index {
                            domain_deps[index].insert(target);
                        }
                    }
                }
            }
        }
    }

    // stable topological order: among the ready domains, always pick the one
    // whose first member appears earliest in the source
    let mut emitted = vec![false; domains.len()];
    let mut result = Vec::with_capacity(domains.len());
    for _ in 0..domains.len() {
        let next = (0..domains.len())
            .filter(|&candidate| !emitted[candidate])
            .filter(|&candidate| {
                domain_deps[candidate]
                    .iter()
                    .all(|&dependency| emitted[dependency])
            })
            .min_by_key(|&candidate| {
                domains[candidate]
                    .iter()
                    .filter_map(|member| position.get(member.as_str()))
                    .min()
                    .copied()
                    .unwrap_or(usize::MAX)
            });
        let Some(next) = next else {
            // unreachable for closures derived from a finite graph: every
            // cycle is already merged into a single domain
            break;
        };
        emitted[next] = true;
        result.push(domains[next].clone());
    }
    result
}

#[cfg(test)]
mod tests {
    use ahash::{AHashMap, AHashSet};
    use pretty_assertions::assert_eq;

    use super::{recursion_domains, transitive_closures};

    fn graph(edges: &[(&str, &[&str])]) -> AHashMap<String, AHashSet<String>> {
        edges
            .iter()
            .map(|(name, deps)| {
                (
                    (*name).to_owned(),
                    deps.iter().map(|d| (*d).to_owned()).collect(),
                )
            })
            .collect()
    }

    fn order(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_owned()).collect()
    }

    #[test]
    fn independent_declarations_keep_source_order() {
        let deps = graph(&[("a", &[]), ("b", &[]), ("c", &[])]);
        let domains = recursion_domains(&order(&["a", "b", "c"]), &transitive_closures(&deps));
        assert_eq!(domains, [vec!["a".to_owned()], vec!["b".to_owned()], vec!["c".to_owned()]]);
    }

    #[test]
    fn dependencies_precede_dependents() {
        let deps = graph(&[("main", &["helper"]), ("helper", &["base"]), ("base", &[])]);
        let domains =
            recursion_domains(&order(&["main", "helper", "base"]), &transitive_closures(&deps));
        assert_eq!(
            domains,
            [vec!["base".to_owned()], vec!["helper".to_owned()], vec!["main".to_owned()]]
        );
    }

    #[test]
    fn mutual_recursion_forms_a_single_domain() {
        let deps = graph(&[("even", &["odd"]), ("odd", &["even"]), ("use", &["even"])]);
        let domains =
            recursion_domains(&order(&["even", "odd", "use"]), &transitive_closures(&deps));
        assert_eq!(domains, [vec!["even".to_owned(), "odd".to_owned()], vec!["use".to_owned()]]);
    }

    #[test]
    fn self_recursion_is_its_own_domain() {
        let deps = graph(&[("go", &["go"]), ("start", &["go"])]);
        let closures = transitive_closures(&deps);
        assert!(closures["go"].contains("go"));
        let domains = recursion_domains(&order(&["start", "go"]), &closures);
        assert_eq!(domains, [vec!["go".to_owned()], vec!["start".to_owned()]]);
    }

    #[test]
    fn domain_order_is_monotone_in_dependencies() {
        // no earlier domain may depend on a later one
        let deps = graph(&[
            ("a", &["b", "c"]),
            ("b", &["c"]),
            ("c", &["d", "e"]),
            ("d", &["c"]),
            ("e", &[]),
        ]);
        let closures = transitive_closures(&deps);
        let domains = recursion_domains(&order(&["a", "b", "c", "d", "e"]), &closures);
        let mut seen: Vec<&str> = Vec::new();
        for domain in &domains {
            for member in domain {
                for dependency in &closures[member] {
                    let in_domain = domain.iter().any(|m| m == dependency);
                    assert!(
                        in_domain || seen.contains(&dependency.as_str()),
                        "{member} depends on {dependency} which is not yet emitted"
                    );
                }
            }
            for member in domain {
                seen.push(member);
            }
        }
    }
}
