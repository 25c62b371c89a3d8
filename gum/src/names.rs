use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

/// Hands out display names of the form `label[kind#n]`.
///
/// `n` counts up from zero for every distinct `label[kind` prefix, so reusing
/// the same label for several units of the same kind still yields unique names.
/// Counting per rendered prefix, not per pair, keeps labels or kinds that
/// contain `[` from colliding.
/// A generator is owned by one [`Supervisor`](crate::Supervisor) unless the caller
/// shares one explicitly through an `Arc`.
#[derive(Debug, Default)]
pub struct NameGenerator {
    ids: Mutex<HashMap<String, u64>>,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the next suffix for `label[kind`.
    pub fn next(&self, label: &str, kind: &str) -> u64 {
        self.next_for(format!("{label}[{kind}"))
    }

    pub fn display_name(&self, label: &str, kind: &str) -> String {
        let prefix = format!("{label}[{kind}");
        let id = self.next_for(prefix.clone());
        format!("{prefix}#{id}]")
    }

    fn next_for(&self, prefix: String) -> u64 {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = ids.entry(prefix).or_insert(0);
        let id = *slot;
        *slot += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashSet, sync::Arc};

    #[test]
    fn counter_is_per_label_and_kind() {
        let names = NameGenerator::new();
        assert_eq!(names.display_name("w1", "Type"), "w1[Type#0]");
        assert_eq!(names.display_name("w2", "Type"), "w2[Type#0]");
        assert_eq!(names.display_name("w1", "Type"), "w1[Type#1]");
        assert_eq!(names.display_name("w1", "Other"), "w1[Other#0]");
        assert_eq!(names.next("w1", "Type"), 2);
    }

    #[test]
    fn brackets_in_label_or_kind_do_not_collide() {
        let names = NameGenerator::new();
        let a = names.display_name("a[b", "c");
        let b = names.display_name("a", "b[c");
        assert_ne!(a, b);
        assert_eq!(a, "a[b[c#0]");
        assert_eq!(b, "a[b[c#1]");
    }

    #[test]
    fn separate_generators_do_not_share_state() {
        let a = NameGenerator::new();
        let b = NameGenerator::new();
        assert_eq!(a.display_name("db", "Pool"), "db[Pool#0]");
        assert_eq!(b.display_name("db", "Pool"), "db[Pool#0]");
    }

    #[test]
    fn concurrent_callers_get_distinct_names() {
        let names = Arc::new(NameGenerator::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let names = names.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| names.display_name("worker", "Poller"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for t in threads {
            for name in t.join().unwrap() {
                assert!(seen.insert(name));
            }
        }
        assert_eq!(seen.len(), 800);
        assert!(seen.contains("worker[Poller#0]"));
        assert!(seen.contains("worker[Poller#799]"));
    }
}
