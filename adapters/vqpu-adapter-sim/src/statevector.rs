//! Statevector kernels.
//!
//! Amplitude index bit `k` holds qubit `k` (qubit 0 is least significant).
//! Two-qubit matrices act on the basis `|q1 q0⟩`, so row `r` corresponds to
//! `q0 = r & 1`, `q1 = r >> 1`.

use num_complex::Complex64;
use rand::Rng;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

use vqpu_ir::Gate;

/// A 2x2 complex matrix, row-major.
pub type Matrix2 = [[Complex64; 2]; 2];

/// A 4x4 complex matrix, row-major.
pub type Matrix4 = [[Complex64; 4]; 4];

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

/// A statevector representing a quantum state.
pub struct Statevector {
    /// The state amplitudes (2^n complex numbers).
    amplitudes: Vec<Complex64>,
    /// Number of qubits.
    num_qubits: usize,
}

impl Statevector {
    /// Create a new statevector initialized to |0...0⟩.
    pub fn new(num_qubits: usize) -> Self {
        let mut amplitudes = vec![ZERO; 1 << num_qubits];
        amplitudes[0] = ONE;
        Self {
            amplitudes,
            num_qubits,
        }
    }

    /// Get the number of qubits.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Amplitude of basis state `index`.
    #[cfg(test)]
    pub fn amplitude(&self, index: usize) -> Complex64 {
        self.amplitudes[index]
    }

    /// Apply a gate. Operand count must already be validated.
    pub fn apply_gate(&mut self, gate: &Gate, qubits: &[usize]) {
        match gate {
            Gate::I => {}
            Gate::Swap => self.apply_swap(qubits[0], qubits[1]),
            Gate::CX | Gate::CY | Gate::CZ | Gate::CH => {
                let target = match gate {
                    Gate::CX => pauli_x(),
                    Gate::CY => pauli_y(),
                    Gate::CZ => pauli_z(),
                    _ => hadamard(),
                };
                self.apply_controlled(qubits[0], qubits[1], &target);
            }
            Gate::CRx(t) => self.apply_controlled(qubits[0], qubits[1], &rx(*t)),
            Gate::CRy(t) => self.apply_controlled(qubits[0], qubits[1], &ry(*t)),
            Gate::CRz(t) => self.apply_controlled(qubits[0], qubits[1], &rz(*t)),
            Gate::CP(t) => self.apply_controlled(qubits[0], qubits[1], &phase(*t)),
            Gate::ECR => self.apply_two(qubits[0], qubits[1], &ecr()),
            Gate::Unitary(rows) if rows.len() == 4 => {
                let mut m = [[ZERO; 4]; 4];
                for (r, row) in rows.iter().enumerate() {
                    m[r].copy_from_slice(row);
                }
                self.apply_two(qubits[0], qubits[1], &m);
            }
            Gate::Unitary(rows) => {
                let m = [[rows[0][0], rows[0][1]], [rows[1][0], rows[1][1]]];
                self.apply_single(qubits[0], &m);
            }
            single => self.apply_single(qubits[0], &single_qubit_matrix(single)),
        }
    }

    // =========================================================================
    // Kernels
    // =========================================================================

    fn apply_single(&mut self, qubit: usize, m: &Matrix2) {
        let mask = 1 << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = m[0][0] * a + m[0][1] * b;
                self.amplitudes[j] = m[1][0] * a + m[1][1] * b;
            }
        }
    }

    fn apply_controlled(&mut self, control: usize, target: usize, m: &Matrix2) {
        let ctrl_mask = 1 << control;
        let tgt_mask = 1 << target;
        for i in 0..self.amplitudes.len() {
            if (i & ctrl_mask != 0) && (i & tgt_mask == 0) {
                let j = i | tgt_mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = m[0][0] * a + m[0][1] * b;
                self.amplitudes[j] = m[1][0] * a + m[1][1] * b;
            }
        }
    }

    fn apply_two(&mut self, q0: usize, q1: usize, m: &Matrix4) {
        let mask0 = 1 << q0;
        let mask1 = 1 << q1;
        for base in 0..self.amplitudes.len() {
            if base & (mask0 | mask1) != 0 {
                continue;
            }
            let idx = [base, base | mask0, base | mask1, base | mask0 | mask1];
            let old = idx.map(|k| self.amplitudes[k]);
            for (r, &k) in idx.iter().enumerate() {
                self.amplitudes[k] = (0..4).map(|c| m[r][c] * old[c]).sum();
            }
        }
    }

    fn apply_swap(&mut self, q1: usize, q2: usize) {
        let mask1 = 1 << q1;
        let mask2 = 1 << q2;
        for i in 0..self.amplitudes.len() {
            if (i & mask1 != 0) && (i & mask2 == 0) {
                let j = (i & !mask1) | mask2;
                self.amplitudes.swap(i, j);
            }
        }
    }

    /// Probability that `qubit` reads 1.
    pub fn probability_one(&self, qubit: usize) -> f64 {
        let mask = 1 << qubit;
        self.amplitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| i & mask != 0)
            .map(|(_, amp)| amp.norm_sqr())
            .sum()
    }

    /// Measure `qubit`, collapsing and renormalizing the state.
    pub fn measure<R: Rng>(&mut self, qubit: usize, rng: &mut R) -> bool {
        let p1 = self.probability_one(qubit);
        let outcome = rng.r#gen::<f64>() < p1;
        let kept = if outcome { p1 } else { 1.0 - p1 };

        let mask = 1 << qubit;
        let norm = kept.sqrt();
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if (i & mask != 0) == outcome {
                if norm > 0.0 {
                    *amp /= norm;
                }
            } else {
                *amp = ZERO;
            }
        }
        outcome
    }
}

// =============================================================================
// Gate matrices
// =============================================================================

fn pauli_x() -> Matrix2 {
    [[ZERO, ONE], [ONE, ZERO]]
}

fn pauli_y() -> Matrix2 {
    [[ZERO, -I], [I, ZERO]]
}

fn pauli_z() -> Matrix2 {
    [[ONE, ZERO], [ZERO, -ONE]]
}

fn hadamard() -> Matrix2 {
    let h = Complex64::new(FRAC_1_SQRT_2, 0.0);
    [[h, h], [h, -h]]
}

fn phase(theta: f64) -> Matrix2 {
    [[ONE, ZERO], [ZERO, Complex64::from_polar(1.0, theta)]]
}

fn rx(theta: f64) -> Matrix2 {
    let c = Complex64::new((theta / 2.0).cos(), 0.0);
    let s = Complex64::new(0.0, -(theta / 2.0).sin());
    [[c, s], [s, c]]
}

fn ry(theta: f64) -> Matrix2 {
    let c = Complex64::new((theta / 2.0).cos(), 0.0);
    let s = Complex64::new((theta / 2.0).sin(), 0.0);
    [[c, -s], [s, c]]
}

fn rz(theta: f64) -> Matrix2 {
    [
        [Complex64::from_polar(1.0, -theta / 2.0), ZERO],
        [ZERO, Complex64::from_polar(1.0, theta / 2.0)],
    ]
}

fn u(theta: f64, phi: f64, lambda: f64) -> Matrix2 {
    let c = (theta / 2.0).cos();
    let s = (theta / 2.0).sin();
    [
        [Complex64::new(c, 0.0), -Complex64::from_polar(s, lambda)],
        [
            Complex64::from_polar(s, phi),
            Complex64::from_polar(c, phi + lambda),
        ],
    ]
}

fn sx(sign: f64) -> Matrix2 {
    let a = Complex64::new(0.5, 0.5 * sign);
    let b = Complex64::new(0.5, -0.5 * sign);
    [[a, b], [b, a]]
}

fn ecr() -> Matrix4 {
    let r = FRAC_1_SQRT_2;
    let re = |x: f64| Complex64::new(x * r, 0.0);
    let im = |x: f64| Complex64::new(0.0, x * r);
    [
        [ZERO, re(1.0), ZERO, im(1.0)],
        [re(1.0), ZERO, im(-1.0), ZERO],
        [ZERO, im(1.0), ZERO, re(1.0)],
        [im(-1.0), ZERO, re(1.0), ZERO],
    ]
}

fn single_qubit_matrix(gate: &Gate) -> Matrix2 {
    match gate {
        Gate::X => pauli_x(),
        Gate::Y => pauli_y(),
        Gate::Z => pauli_z(),
        Gate::H => hadamard(),
        Gate::S => phase(PI / 2.0),
        Gate::Sdg => phase(-PI / 2.0),
        Gate::T => phase(PI / 4.0),
        Gate::Tdg => phase(-PI / 4.0),
        Gate::SX => sx(1.0),
        Gate::SXdg => sx(-1.0),
        Gate::Rx(t) => rx(*t),
        Gate::Ry(t) => ry(*t),
        Gate::Rz(t) => rz(*t),
        Gate::P(t) => phase(*t),
        Gate::U(t, p, l) => u(*t, *p, *l),
        _ => [[ONE, ZERO], [ZERO, ONE]],
    }
}
