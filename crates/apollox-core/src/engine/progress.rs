#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    GenerationStart { generation: u32, total: u32 },
    GenerationFinish { generation: u32, evaluated: usize },

    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Forwards [`Progress`] events to an optional callback.
///
/// Reporting is safe from worker threads; events from concurrent tasks
/// arrive in completion order.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Reports a whole phase around `f`.
    pub fn phase<T>(&self, name: &'static str, f: impl FnOnce() -> T) -> T {
        self.report(Progress::PhaseStart { name });
        let result = f();
        self.report(Progress::PhaseFinish);
        result
    }
}
