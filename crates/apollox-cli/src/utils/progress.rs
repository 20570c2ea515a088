use apollox::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

/// Renders engine [`Progress`] events as a single reusable indicatif bar.
///
/// While a search runs, the bar is prefixed with the current generation so
/// every phase reads as `gen g/G`.
#[derive(Clone)]
pub struct CliProgressHandler {
    pb: Arc<Mutex<ProgressBar>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0)
            .with_style(Self::spinner_style())
            .with_message("Initializing...");
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.disable_steady_tick();
        pb.finish_and_clear();

        Self {
            pb: Arc::new(Mutex::new(pb)),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let pb_clone = self.pb.clone();

        Box::new(move |progress: Progress| {
            let Ok(mut pb_guard) = pb_clone.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };

            match progress {
                Progress::GenerationStart { generation, total } => {
                    pb_guard.set_prefix(generation_prefix(generation, total));
                    pb_guard.println(format!("── Generation {}/{} ──", generation, total));
                }
                Progress::GenerationFinish {
                    generation,
                    evaluated,
                } => {
                    pb_guard.println(format!(
                        "✓ Generation {} evaluated {} structure(s)",
                        generation, evaluated
                    ));
                }
                Progress::PhaseStart { name } => {
                    pb_guard.reset();
                    pb_guard.set_length(0);
                    pb_guard.set_style(Self::spinner_style());
                    pb_guard.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                    pb_guard.set_message(name.to_string());
                }
                Progress::PhaseFinish => {
                    pb_guard.disable_steady_tick();
                    pb_guard.finish_with_message("✓ Done");
                }
                Progress::TaskStart { total_steps } => {
                    pb_guard.disable_steady_tick();
                    pb_guard.reset();
                    pb_guard.set_length(total_steps);
                    pb_guard.set_position(0);
                    pb_guard.set_style(Self::bar_style());
                }
                Progress::TaskIncrement => {
                    pb_guard.inc(1);
                }
                Progress::TaskFinish => {
                    if pb_guard.position() < pb_guard.length().unwrap_or(0) {
                        pb_guard.set_position(pb_guard.length().unwrap_or(0));
                    }
                    pb_guard.finish();
                }
                Progress::Message(msg) => {
                    if !pb_guard.is_finished() {
                        pb_guard.println(format!("  {}", msg));
                    } else {
                        pb_guard.set_message(msg);
                    }
                }
            }
        })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {prefix:.bold.dim} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{prefix:.bold.dim} {msg:<24} [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .with_key(
                "eta",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
                },
            )
            .progress_chars("##-")
    }
}

fn generation_prefix(generation: u32, total: u32) -> String {
    format!("gen {}/{}", generation, total)
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn handler_initializes_in_a_clean_state() {
        let handler = CliProgressHandler::new();
        let pb = handler.pb.lock().unwrap();
        assert_eq!(pb.length(), Some(0));
        assert!(pb.is_finished());
    }

    #[test]
    fn relaxation_phase_drives_the_bar() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart {
            name: "Relaxing structures",
        });
        {
            let pb = handler.pb.lock().unwrap();
            assert_eq!(pb.message(), "Relaxing structures");
            assert!(!pb.is_finished());
        }

        callback(Progress::TaskStart { total_steps: 12 });
        callback(Progress::TaskIncrement);
        callback(Progress::TaskIncrement);
        {
            let pb = handler.pb.lock().unwrap();
            assert_eq!(pb.length(), Some(12));
            assert_eq!(pb.position(), 2);
        }

        callback(Progress::TaskFinish);
        {
            let pb = handler.pb.lock().unwrap();
            assert!(pb.is_finished());
            assert_eq!(pb.position(), 12);
        }

        callback(Progress::PhaseFinish);
        assert_eq!(handler.pb.lock().unwrap().message(), "✓ Done");
    }

    #[test]
    fn generation_start_sets_the_prefix_without_starting_the_bar() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();
        assert_eq!(handler.pb.lock().unwrap().prefix(), "");

        callback(Progress::GenerationStart {
            generation: 2,
            total: 5,
        });
        callback(Progress::GenerationFinish {
            generation: 2,
            evaluated: 7,
        });

        let pb = handler.pb.lock().unwrap();
        assert_eq!(pb.prefix(), "gen 2/5");
        assert!(pb.is_finished());
        assert_eq!(pb.length(), Some(0));
    }

    #[test]
    fn generation_prefix_follows_the_search_through_its_phases() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        for generation in 1..=3 {
            callback(Progress::GenerationStart {
                generation,
                total: 3,
            });
            callback(Progress::PhaseStart { name: "Relaxing" });
            callback(Progress::TaskStart { total_steps: 4 });
            callback(Progress::TaskIncrement);
            {
                let pb = handler.pb.lock().unwrap();
                assert_eq!(pb.prefix(), format!("gen {}/3", generation));
                assert_eq!(pb.position(), 1);
            }
            callback(Progress::TaskFinish);
            callback(Progress::PhaseFinish);
            callback(Progress::GenerationFinish {
                generation,
                evaluated: 4,
            });
        }

        assert_eq!(handler.pb.lock().unwrap().prefix(), "gen 3/3");
    }

    #[test]
    fn messages_after_finish_replace_the_bar_message() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(Progress::Message("Backfilled 3 records".to_string()));
        assert_eq!(
            handler.pb.lock().unwrap().message(),
            "Backfilled 3 records"
        );
    }

    #[test]
    fn callback_is_thread_safe() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        thread::spawn(move || {
            callback(Progress::PhaseStart {
                name: "Describing structures",
            });
            callback(Progress::TaskIncrement);
            callback(Progress::PhaseFinish);
        })
        .join()
        .unwrap();

        let pb = handler.pb.lock().unwrap();
        assert!(pb.is_finished());
        assert_eq!(pb.message(), "✓ Done");
    }
}
