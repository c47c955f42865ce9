mod linear;

pub use linear::*;

use crate::Samples;

/// Id bound used for random draws when a [`ModuleSource`] has no known
/// length.
pub const DEFAULT_MAX_ID: usize = i16::MAX as usize;

/// A function mapping samples to a lower-dimensional representation.
///
/// `project` receives `n` samples and returns their images laid out
/// sample-major, `n * output_width` values in total.
pub trait Projection {
    fn project(&mut self, samples: Samples<'_>) -> Vec<f32>;
}

impl<F> Projection for F
where
    F: FnMut(Samples<'_>) -> Vec<f32>,
{
    fn project(&mut self, samples: Samples<'_>) -> Vec<f32> {
        self(samples)
    }
}

/// An indexed, reproducible collection of projections.
///
/// `get(id)` must be deterministic: the same id yields instances with the
/// same behavior, in any thread and any number of times, because a single id
/// may be drawn and sketched repeatedly.
pub trait ModuleSource: Send + Sync {
    type Module: Projection;

    fn get(&self, id: usize) -> Self::Module;

    /// Number of modules, or `None` for an open-ended family.
    fn len(&self) -> Option<usize> {
        None
    }

    /// Reinitializes `module` in place so that it behaves like
    /// `self.get(id)`.
    ///
    /// The default builds a fresh instance; sources with expensive
    /// allocations should reseed the existing one instead.
    fn recycle(&self, module: &mut Self::Module, id: usize) {
        *module = self.get(id);
    }
}

/// Keeps one module instance alive and recycles it for every requested id.
pub struct Recycler<'a, S: ModuleSource + ?Sized> {
    source: &'a S,
    current: Option<S::Module>,
}

impl<'a, S: ModuleSource + ?Sized> Recycler<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            current: None,
        }
    }

    /// Returns the module for `id`, allocating only on the first call.
    pub fn fetch(&mut self, id: usize) -> &mut S::Module {
        let module = match self.current.take() {
            Some(mut module) => {
                self.source.recycle(&mut module, id);
                module
            }
            None => self.source.get(id),
        };
        self.current.insert(module)
    }
}

/// A [`ModuleSource`] backed by a closure.
pub struct ModuleFn<F> {
    build: F,
    len: Option<usize>,
}

impl<F, M> ModuleFn<F>
where
    F: Fn(usize) -> M + Send + Sync,
    M: Projection,
{
    pub fn new(len: Option<usize>, build: F) -> Self {
        Self { build, len }
    }
}

impl<F, M> ModuleSource for ModuleFn<F>
where
    F: Fn(usize) -> M + Send + Sync,
    M: Projection,
{
    type Module = M;

    fn get(&self, id: usize) -> M {
        (self.build)(id)
    }

    fn len(&self) -> Option<usize> {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        built: AtomicUsize,
        recycled: AtomicUsize,
    }

    impl ModuleSource for Counting {
        type Module = Scale;

        fn get(&self, id: usize) -> Scale {
            self.built.fetch_add(1, Ordering::Relaxed);
            Scale(id as f32)
        }

        fn recycle(&self, module: &mut Scale, id: usize) {
            self.recycled.fetch_add(1, Ordering::Relaxed);
            module.0 = id as f32;
        }
    }

    struct Scale(f32);

    impl Projection for Scale {
        fn project(&mut self, samples: Samples<'_>) -> Vec<f32> {
            samples.as_slice().iter().map(|x| x * self.0).collect()
        }
    }

    #[test]
    fn recycler_allocates_once() {
        let source = Counting {
            built: AtomicUsize::new(0),
            recycled: AtomicUsize::new(0),
        };
        let mut recycler = Recycler::new(&source);
        assert_eq!(recycler.fetch(3).0, 3.0);
        assert_eq!(recycler.fetch(5).0, 5.0);
        assert_eq!(recycler.fetch(1).0, 1.0);
        assert_eq!(source.built.load(Ordering::Relaxed), 1);
        assert_eq!(source.recycled.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn closures_are_projections_and_sources() {
        let source = ModuleFn::new(Some(4), |id| {
            move |s: Samples<'_>| s.as_slice().iter().map(|x| x + id as f32).collect()
        });
        assert_eq!(source.len(), Some(4));

        let batch = crate::Batch::new(vec![1.0, 2.0], 1).unwrap();
        let mut module = source.get(2);
        assert_eq!(module.project(batch.samples()), vec![3.0, 4.0]);
    }
}
