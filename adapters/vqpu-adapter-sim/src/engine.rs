//! Statevector engine implementation.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, trace};

use vqpu_hal::{EngineConfig, EngineFactory, HalError, HalResult, SimulationEngine};
use vqpu_ir::Gate;

use crate::statevector::Statevector;

/// Name the engine registers under.
pub const ENGINE_NAME: &str = "statevector";

/// Default register limit (2^26 amplitudes, 1 GiB).
pub const DEFAULT_MAX_QUBITS: usize = 26;

/// Exact statevector engine with collapse-on-measure.
///
/// The combined register of a co-execution group lives here for the duration
/// of a shot. Memory grows as 2^n, so the register size is capped.
pub struct StatevectorEngine {
    state: Statevector,
    rng: StdRng,
    max_qubits: usize,
}

impl StatevectorEngine {
    /// Create an engine with an entropy-seeded random source.
    pub fn new() -> Self {
        Self {
            state: Statevector::new(0),
            rng: StdRng::from_entropy(),
            max_qubits: DEFAULT_MAX_QUBITS,
        }
    }

    /// Create an engine with a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new()
        }
    }

    /// Override the register limit.
    #[must_use]
    pub fn with_max_qubits(mut self, max_qubits: usize) -> Self {
        self.max_qubits = max_qubits;
        self
    }

    /// Probability that `qubit` reads 1, without collapsing.
    pub fn probability_one(&self, qubit: usize) -> HalResult<f64> {
        self.check_qubit(qubit)?;
        Ok(self.state.probability_one(qubit))
    }

    fn check_qubit(&self, qubit: usize) -> HalResult<()> {
        if qubit >= self.state.num_qubits() {
            return Err(HalError::QubitOutOfRange {
                qubit,
                num_qubits: self.state.num_qubits(),
            });
        }
        Ok(())
    }

    fn check_operands(&self, gate: &Gate, qubits: &[usize]) -> HalResult<()> {
        if qubits.len() != gate.num_qubits() {
            return Err(HalError::OperandMismatch {
                gate: gate.name().to_string(),
                expected: gate.num_qubits(),
                got: qubits.len(),
            });
        }
        for &q in qubits {
            self.check_qubit(q)?;
        }
        if qubits.len() == 2 && qubits[0] == qubits[1] {
            return Err(HalError::Engine(format!(
                "Gate '{}' applied twice to qubit {}",
                gate.name(),
                qubits[0]
            )));
        }
        if let Gate::Unitary(rows) = gate {
            let dim = rows.len();
            if !(dim == 2 || dim == 4) || rows.iter().any(|row| row.len() != dim) {
                return Err(HalError::Unsupported(format!(
                    "unitary of dimension {dim}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for StatevectorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for StatevectorEngine {
    fn from_config(config: EngineConfig) -> HalResult<Self> {
        let mut engine = match config.seed {
            Some(seed) => Self::with_seed(seed),
            None => Self::new(),
        };
        if let Some(value) = config.extra.get("max_qubits") {
            let max = value.as_u64().ok_or_else(|| {
                HalError::Engine(format!("max_qubits must be an integer, got {value}"))
            })?;
            engine.max_qubits = usize::try_from(max).unwrap_or(usize::MAX);
        }
        Ok(engine)
    }
}

impl SimulationEngine for StatevectorEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn num_qubits(&self) -> usize {
        self.state.num_qubits()
    }

    fn initialize(&mut self, num_qubits: usize) -> HalResult<()> {
        if num_qubits > self.max_qubits {
            return Err(HalError::RegisterTooLarge {
                requested: num_qubits,
                max: self.max_qubits,
            });
        }
        trace!("Initializing {}-qubit register", num_qubits);
        self.state = Statevector::new(num_qubits);
        Ok(())
    }

    fn apply_gate(&mut self, gate: &Gate, qubits: &[usize]) -> HalResult<()> {
        self.check_operands(gate, qubits)?;
        self.state.apply_gate(gate, qubits);
        Ok(())
    }

    fn measure(&mut self, qubit: usize) -> HalResult<bool> {
        self.check_qubit(qubit)?;
        Ok(self.state.measure(qubit, &mut self.rng))
    }

    fn set_seed(&mut self, seed: u64) {
        debug!("Reseeding statevector engine with {}", seed);
        self.rng = StdRng::seed_from_u64(seed);
    }
}
