//! Generic per-primitive registry, one-shot dispatch cache, and wisdom
//! re-ranking. One [`Dispatcher<F>`] exists per DSP primitive; `F` is the
//! primitive's function-pointer type.

use std::sync::{Mutex, RwLock};

/// A single registered implementation of a primitive.
pub struct KernelEntry<F: Copy + 'static> {
    pub rank: usize,
    pub impl_name: &'static str,
    pub flavor: &'static str,
    /// Returns true if the host supports this implementation. `None` means
    /// "always supported" (the scalar fallback).
    pub probe: Option<fn() -> bool>,
    pub f: F,
}

impl<F: Copy + 'static> KernelEntry<F> {
    fn supported(&self) -> bool {
        self.probe.map_or(true, |p| p())
    }
}

pub struct Dispatcher<F: Copy + 'static> {
    name: &'static str,
    entries: Mutex<Vec<KernelEntry<F>>>,
    cached: RwLock<Option<F>>,
}

impl<F: Copy + 'static> Dispatcher<F> {
    pub fn new(name: &'static str, mut entries: Vec<KernelEntry<F>>) -> Self {
        for (i, e) in entries.iter_mut().enumerate() {
            e.rank = i;
        }
        Dispatcher { name, entries: Mutex::new(entries), cached: RwLock::new(None) }
    }

    /// Returns the currently-selected implementation, selecting (and
    /// caching) it on first call after construction or after a wisdom
    /// reorder.
    pub fn get(&self) -> F {
        if let Some(f) = *self.cached.read().unwrap() {
            return f;
        }
        let f = self.select();
        *self.cached.write().unwrap() = Some(f);
        f
    }

    fn select(&self) -> F {
        let entries = self.entries.lock().unwrap();
        for e in entries.iter() {
            if e.supported() {
                return e.f;
            }
        }
        panic!("no implementation of `{}` passes its feature probe; this is a configuration bug", self.name);
    }

    /// Stably reorders the registry: entries whose `impl_name` appears in
    /// `ordered_impl_names` sort by their index in that list; all other
    /// entries keep their relative order and sort after every matched one.
    pub fn set_wisdom(&self, ordered_impl_names: &[String]) {
        let mut entries = self.entries.lock().unwrap();
        let list_len = ordered_impl_names.len();
        let old_ranks: Vec<usize> = entries.iter().map(|e| e.rank).collect();
        let mut indexed: Vec<(usize, KernelEntry<F>)> = entries.drain(..).zip(old_ranks).map(|(e, r)| (r, e)).collect();
        indexed.sort_by_key(|(old_rank, e)| match ordered_impl_names.iter().position(|n| n == e.impl_name) {
            Some(idx) => idx,
            None => list_len + *old_rank,
        });
        for (new_rank, (_, e)) in indexed.iter_mut().enumerate() {
            e.rank = new_rank;
        }
        *entries = indexed.into_iter().map(|(_, e)| e).collect();
        drop(entries);
        *self.cached.write().unwrap() = None;
    }

    pub fn impl_names(&self) -> Vec<&'static str> {
        self.entries.lock().unwrap().iter().map(|e| e.impl_name).collect()
    }

    /// The implementation that would be selected right now, without
    /// consulting or populating the cache. Used by `bench`/`wisdom show`.
    pub fn current_selection(&self) -> &'static str {
        let entries = self.entries.lock().unwrap();
        entries.iter().find(|e| e.supported()).map(|e| e.impl_name).unwrap_or("<none>")
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Type-erased handle so `read_wisdom_file` can apply wisdom across every
/// primitive's `Dispatcher<F>` despite each having a distinct `F`.
pub trait AnyDispatcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn set_wisdom(&self, ordered_impl_names: &[String]);
    fn impl_names(&self) -> Vec<&'static str>;
    fn current_selection(&self) -> &'static str;
}

impl<F: Copy + Send + Sync + 'static> AnyDispatcher for Dispatcher<F> {
    fn name(&self) -> &'static str {
        self.name
    }
    fn set_wisdom(&self, ordered_impl_names: &[String]) {
        Dispatcher::set_wisdom(self, ordered_impl_names)
    }
    fn impl_names(&self) -> Vec<&'static str> {
        Dispatcher::impl_names(self)
    }
    fn current_selection(&self) -> &'static str {
        Dispatcher::current_selection(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(rank: usize, name: &'static str, probe: Option<fn() -> bool>, f: fn(i32) -> i32) -> KernelEntry<fn(i32) -> i32> {
        KernelEntry { rank, impl_name: name, flavor: "test", probe, f }
    }

    #[test]
    fn selects_first_supported_entry() {
        fn never() -> bool {
            false
        }
        fn always() -> bool {
            true
        }
        fn a(x: i32) -> i32 {
            x + 1
        }
        fn b(x: i32) -> i32 {
            x + 2
        }
        let d = Dispatcher::new("p", vec![entry(0, "a", Some(never), a), entry(1, "b", Some(always), b)]);
        assert_eq!((d.get())(10), 12);
    }

    #[test]
    fn wisdom_reorders_and_resets_cache() {
        fn always() -> bool {
            true
        }
        fn a(x: i32) -> i32 {
            x + 1
        }
        fn b(x: i32) -> i32 {
            x + 2
        }
        fn c(x: i32) -> i32 {
            x + 3
        }
        let d = Dispatcher::new(
            "p",
            vec![entry(0, "A", Some(always), a), entry(1, "B", Some(always), b), entry(2, "C", Some(always), c)],
        );
        assert_eq!(d.get()(0), 1); // picks A first
        d.set_wisdom(&["C".to_string(), "A".to_string()]);
        assert_eq!(d.impl_names(), vec!["C", "A", "B"]);
        assert_eq!(d.get()(0), 3); // now picks C first
    }

    #[test]
    #[should_panic(expected = "configuration bug")]
    fn panics_when_no_probe_passes() {
        fn never() -> bool {
            false
        }
        fn a(x: i32) -> i32 {
            x
        }
        let d = Dispatcher::new("p", vec![entry(0, "a", Some(never), a)]);
        d.get();
    }
}
