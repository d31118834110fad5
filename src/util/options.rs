use std::default::Default;

fn always_valid<T>(_: &T) -> bool {
    true
}

/// The prefix of environment variables that override options, e.g. `SATBGC_THREADS=4`.
pub const ENV_PREFIX: &str = "SATBGC_";

macro_rules! options {
    ($($(#[$outer:meta])* $name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($(#[$outer])* $name: $type[$validator] = $default),*);
    ];
    ($($(#[$outer:meta])* $name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        /// Tunables of the collector. `Options::default()` reads overrides from the environment.
        #[derive(Clone, Debug)]
        pub struct Options {
            $($(#[$outer])* pub $name: $type),*
        }
        impl Options {
            /// Options with the built-in defaults, ignoring the environment.
            pub fn builtin() -> Self {
                Options {
                    $($name: $default),*
                }
            }

            /// Set an option by its name. Returns `false` and keeps the old value if the name is
            /// unknown, the value cannot be parsed, or the value is rejected by the validator.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    $(stringify!($name) => match val.parse::<$type>() {
                        Ok(val) => {
                            let validate_fn = $validator;
                            let is_valid = validate_fn(&val);
                            if is_valid {
                                self.$name = val;
                            } else {
                                warn!("Unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                            }
                            is_valid
                        }
                        Err(_) => {
                            warn!("Unable to set {}={:?}. Can't parse value. Default value will be used.", s, val);
                            false
                        }
                    },)*
                    _ => {
                        warn!("Unknown option {}", s);
                        false
                    }
                }
            }

            /// Apply every `SATBGC_<NAME>` environment variable that names an option.
            pub fn read_env_var_settings(&mut self) {
                for (key, val) in std::env::vars() {
                    if let Some(rest_of_key) = key.strip_prefix(ENV_PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { self.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
            }

            /// Apply a whitespace separated list of `name=value` pairs. Stops at the first bad
            /// pair and returns `Err` naming it.
            pub fn set_bulk_from_command_line(&mut self, options: &str) -> Result<(), String> {
                for opt in options.split_ascii_whitespace() {
                    let (key, val) = opt
                        .split_once('=')
                        .ok_or_else(|| format!("Malformed option {:?}, expected name=value", opt))?;
                    if !self.set_from_str(key, val) {
                        return Err(format!("Failed to set option {:?}", opt));
                    }
                }
                Ok(())
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Options::builtin();
                options.read_env_var_settings();
                options
            }
        }
    ]
}

options! {
    /// Number of GC worker threads.
    threads:                   usize [|v: &usize| *v > 0] = num_cpus::get(),
    /// Length of the sliding pause window, in microseconds.
    pause_window_us:           u64   [|v: &u64| *v > 0] = 20_000,
    /// Total stop-the-world time allowed within one pause window, in microseconds.
    pause_budget_us:           u64   [always_valid] = 10_000,
    /// Number of pauses remembered by the pause window. The oldest is dropped when full.
    pause_window_capacity:     usize [|v: &usize| *v > 0] = 16,
    /// A marking task above this many entries always forks half of them off.
    fork_high_water:           usize [always_valid] = 16,
    /// A marking task above this many entries forks when some worker is idle.
    fork_low_water:            usize [always_valid] = 8,
    /// Below the high-water mark, fork `len / fork_low_water_divisor` entries (at least one).
    fork_low_water_divisor:    usize [|v: &usize| *v > 0] = 8,
    /// A root stack is split across workers only if it has this many entries per worker.
    min_chunk_size:            usize [|v: &usize| *v > 0] = 16,
    /// SATB remark stacks at least this large are traced in parallel.
    parallel_remark_threshold: usize [always_valid] = 128,
    /// SATB drain/trace rounds before the remark falls back to stopping the world.
    satb_max_iterations:       usize [|v: &usize| *v > 0] = 1000,
    /// Time spent in concurrent SATB remark before falling back to stopping the world.
    satb_max_duration_ms:      u64   [always_valid] = 120_000,
    /// Workers active during concurrent marking. Zero means half of the pool, at least one.
    concurrent_mark_workers:   usize [always_valid] = 0,
    /// Scheduling niceness of workers during concurrent marking. Restoring the niceness after
    /// marking needs `CAP_SYS_NICE` or a matching `RLIMIT_NICE` on Linux.
    concurrent_mark_nice:      i32   [|v: &i32| (-20..=19).contains(v)] = 0,
    /// Evacuate live objects out of the from-space at the end of a cycle.
    copy_regions:              bool  [always_valid] = true,
}
