// Readiness latency benchmark
// Measures how long ensure_ready blocks in the common cases
// Target: present device p50 < 1ms; late device within one poll interval of its arrival

use devgate::config::policy::{ReadinessPolicy, ServiceProfile};
use devgate::kernel::readiness::{ReadinessController, POLL_INTERVAL};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// Benchmark configuration
const ITERATIONS: usize = 200;
const WARMUP_ITERATIONS: usize = 20;
const LATE_ITERATIONS: usize = 20;

/// Sorted latency samples for one scenario
struct Samples {
    sorted: Vec<Duration>,
}

impl Samples {
    fn new(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        Self { sorted: samples }
    }

    fn count(&self) -> usize {
        self.sorted.len()
    }

    /// Nearest-rank percentile, `q` in `0.0..=1.0`
    fn percentile(&self, q: f64) -> Duration {
        let rank = ((self.count() as f64 * q).ceil() as usize).clamp(1, self.count());
        self.sorted[rank - 1]
    }
}

/// What a scenario must stay under, and at which percentile
struct Budget {
    label: &'static str,
    quantile: f64,
    limit: Duration,
}

impl Budget {
    fn check(&self, samples: &Samples) -> Result<Duration, Duration> {
        let observed = samples.percentile(self.quantile);
        if observed < self.limit {
            Ok(observed)
        } else {
            Err(observed)
        }
    }
}

struct Scenario {
    name: String,
    samples: Samples,
    budget: Budget,
}

impl Scenario {
    /// Print the report line and return whether the budget held
    fn report(&self) -> bool {
        let verdict = self.budget.check(&self.samples);
        let observed = match verdict {
            Ok(d) | Err(d) => d,
        };
        println!(
            "\n{} ({} samples, p50 {:?}, max {:?})",
            self.name,
            self.samples.count(),
            self.samples.percentile(0.5),
            self.samples.percentile(1.0)
        );
        println!(
            "  {} p{:.0} = {:?}, budget {:?}: {}",
            self.budget.label,
            self.budget.quantile * 100.0,
            observed,
            self.budget.limit,
            if verdict.is_ok() { "ok" } else { "over budget" }
        );
        verdict.is_ok()
    }
}

fn profile_in(dir: &std::path::Path) -> ServiceProfile {
    ServiceProfile {
        device_prefix: PathBuf::from(format!("{}/", dir.display())),
        ..ServiceProfile::default()
    }
}

const POLICY: ReadinessPolicy = ReadinessPolicy {
    load_enabled: false,
    timeout_secs: 5,
};

/// Device node already present: one existence check, one probe
fn benchmark_present_device() -> Scenario {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("svc"), b"").expect("create node");
    let controller = ReadinessController::new(profile_in(dir.path()));

    for _ in 0..WARMUP_ITERATIONS {
        let _ = controller.ensure_ready_with("svc", &POLICY);
    }

    let mut samples = Vec::new();
    for _ in 0..ITERATIONS {
        let start = Instant::now();
        controller
            .ensure_ready_with("svc", &POLICY)
            .expect("present device must be ready");
        samples.push(start.elapsed());
    }

    Scenario {
        name: "Present device".to_string(),
        samples: Samples::new(samples),
        budget: Budget {
            label: "call latency",
            quantile: 0.5,
            limit: Duration::from_millis(1),
        },
    }
}

/// Control device created `delay` after the call starts
fn benchmark_late_device(delay: Duration) -> Scenario {
    let mut overshoot = Vec::new();

    for _ in 0..LATE_ITERATIONS {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("svc"), b"").expect("create node");
        let ctl = dir.path().join("ctl");
        let mut profile = profile_in(dir.path());
        profile.control_device = Some(ctl.clone());
        let controller = ReadinessController::new(profile);

        let creator = thread::spawn(move || {
            thread::sleep(delay);
            std::fs::write(ctl, b"").expect("create control device");
        });

        let start = Instant::now();
        controller
            .ensure_ready_with("svc", &POLICY)
            .expect("late device must become ready");
        overshoot.push(start.elapsed().saturating_sub(delay));
        creator.join().expect("creator thread");
    }

    // Detection may lag arrival by at most one sleep, plus scheduling noise.
    Scenario {
        name: format!("Device appearing after {:?}", delay),
        samples: Samples::new(overshoot),
        budget: Budget {
            label: "overshoot past arrival",
            quantile: 0.95,
            limit: POLL_INTERVAL + Duration::from_millis(5),
        },
    }
}

fn main() {
    println!("=== devgate Readiness Latency Benchmark ===");
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let scenarios = [
        benchmark_present_device(),
        benchmark_late_device(Duration::from_millis(2)),
        benchmark_late_device(Duration::from_millis(50)),
    ];

    let over_budget: Vec<&str> = scenarios
        .iter()
        .filter(|scenario| !scenario.report())
        .map(|scenario| scenario.name.as_str())
        .collect();

    println!("\n=== Summary ===");
    if over_budget.is_empty() {
        println!("all {} scenarios within budget", scenarios.len());
    } else {
        println!("over budget: {}", over_budget.join(", "));
        std::process::exit(1);
    }
}
