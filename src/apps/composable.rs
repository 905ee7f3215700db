//! App trait, chaining and batch execution.
//!
//! An app takes one input and produces one output or a [`NotCompleted`].
//! Two apps chain with [`App::then`] (or `+`) only when the first app's
//! output type is the second app's input type, so a mistyped pipeline does
//! not compile. A failure entering a chain is handed to each downstream
//! [`App::call`] untouched; only writers look at it, to record it.

use crate::core::config::ApplyOptions;
use crate::core::error::BioappError;
use crate::core::not_completed::{AppResult, NotCompleted};
use crate::core::parallel;
use crate::core::store::DataStore;
use indicatif::{ProgressBar, ProgressStyle};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

pub trait App: Send + Sync {
    type Input: Send;
    type Output: Send;

    fn name(&self) -> &str;

    /// The work done on a successful input.
    fn main(&self, input: Self::Input) -> AppResult<Self::Output>;

    /// Entry point used inside a pipeline. Failures pass straight through
    /// without invoking [`App::main`].
    fn call(&self, input: AppResult<Self::Input>) -> AppResult<Self::Output> {
        self.main(input?)
    }

    fn run(&self, input: Self::Input) -> AppResult<Self::Output> {
        self.call(Ok(input))
    }

    /// Store written by this app, if it is (or ends in) a writer.
    fn data_store(&self) -> Option<Arc<dyn DataStore>> {
        None
    }

    fn then<B>(self, next: B) -> Compose<Self, B>
    where
        Self: Sized,
        B: App<Input = Self::Output>,
    {
        Compose::new(self, next)
    }

    /// Run the app over every input and return one result per input, in
    /// input order.
    ///
    /// A writable output store runs its one-time preparation (overwrite
    /// clearing) here, before any worker writes. Failures stay in their
    /// slot; only infrastructure errors abort the batch.
    fn apply_to<I, T>(
        &self,
        inputs: I,
        options: &ApplyOptions,
    ) -> Result<Vec<AppResult<Self::Output>>, BioappError>
    where
        Self: Sized,
        I: IntoIterator<Item = T>,
        T: Into<Self::Input>,
    {
        let inputs: Vec<Self::Input> = inputs.into_iter().map(Into::into).collect();
        let total = inputs.len();
        let store = self.data_store();
        if let Some(store) = &store {
            store.prepare()?;
        }

        info!(app = self.name(), total, parallel = options.parallel, "applying app");
        let progress = options
            .show_progress
            .then(|| progress_bar(total as u64, self.name()));

        let results = if options.parallel {
            parallel::map(|x| self.run(x), inputs, &options.workers, progress.as_ref())?
        } else {
            inputs
                .into_iter()
                .map(|x| {
                    let out = self.run(x);
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                    out
                })
                .collect()
        };
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        if options.cleanup {
            if let Some(store) = &store {
                let removed = store.cleanup()?;
                debug!(store = %store.source().display(), removed, "cleaned up output store");
            }
        }

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            app = self.name(),
            completed = total - failed,
            failed,
            "finished applying app"
        );
        Ok(results)
    }
}

fn progress_bar(len: u64, name: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar().template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
        pb.set_style(style);
    }
    pb.set_message(name.to_string());
    pb
}

/// Two apps run back to back.
#[derive(Debug, Clone)]
pub struct Compose<A, B> {
    name: String,
    first: A,
    second: B,
}

impl<A, B> Compose<A, B>
where
    A: App,
    B: App<Input = A::Output>,
{
    pub fn new(first: A, second: B) -> Self {
        let name = format!("{} + {}", first.name(), second.name());
        Self {
            name,
            first,
            second,
        }
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }
}

impl<A, B> App for Compose<A, B>
where
    A: App,
    B: App<Input = A::Output>,
{
    type Input = A::Input;
    type Output = B::Output;

    fn name(&self) -> &str {
        &self.name
    }

    fn main(&self, input: A::Input) -> AppResult<B::Output> {
        self.call(Ok(input))
    }

    fn call(&self, input: AppResult<A::Input>) -> AppResult<B::Output> {
        self.second.call(self.first.call(input))
    }

    fn data_store(&self) -> Option<Arc<dyn DataStore>> {
        self.second.data_store().or_else(|| self.first.data_store())
    }
}

/// Implements `a + b` as `a.then(b)` for the listed app types.
macro_rules! impl_add {
    ($($ty:ident $(<$($g:ident),+>)?),+ $(,)?) => {$(
        impl<$($($g,)+)? Rhs> std::ops::Add<Rhs> for $ty$(<$($g),+>)?
        where
            Self: $crate::apps::composable::App,
            Rhs: $crate::apps::composable::App<
                Input = <Self as $crate::apps::composable::App>::Output,
            >,
        {
            type Output = $crate::apps::composable::Compose<Self, Rhs>;

            fn add(self, rhs: Rhs) -> Self::Output {
                $crate::apps::composable::Compose::new(self, rhs)
            }
        }
    )+};
}

pub(crate) use impl_add;

impl_add!(Compose<A, B>, FnApp<F, I, O>);

/// An app built from a closure.
pub struct FnApp<F, I, O> {
    name: String,
    func: F,
    _types: PhantomData<fn(I) -> O>,
}

impl<F, I, O> App for FnApp<F, I, O>
where
    F: Fn(I) -> AppResult<O> + Send + Sync,
    I: Send,
    O: Send,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn main(&self, input: I) -> AppResult<O> {
        (self.func)(input)
    }
}

/// Wrap `func` as an app named `name`.
///
/// ```
/// use bioapp::apps::composable::{App, app_fn};
/// use bioapp::core::not_completed::NotCompleted;
///
/// let halve = app_fn("halve", |x: i64| {
///     if x % 2 == 0 { Ok(x / 2) } else { Err(NotCompleted::fail("halve", "odd input")) }
/// });
/// assert_eq!(halve.run(4), Ok(2));
/// assert!(halve.run(3).is_err());
/// ```
pub fn app_fn<F, I, O>(name: &str, func: F) -> FnApp<F, I, O>
where
    F: Fn(I) -> AppResult<O> + Send + Sync,
{
    FnApp {
        name: name.to_string(),
        func,
        _types: PhantomData,
    }
}

/// Terminal state of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    PartiallyCompleted,
}

pub fn run_status<T>(results: &[AppResult<T>]) -> RunStatus {
    if results.iter().all(Result::is_ok) {
        RunStatus::Completed
    } else {
        RunStatus::PartiallyCompleted
    }
}

/// The failures of a batch, in input order.
pub fn failures<T>(results: &[AppResult<T>]) -> Vec<&NotCompleted> {
    results.iter().filter_map(|r| r.as_ref().err()).collect()
}
