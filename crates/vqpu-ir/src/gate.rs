//! Gate set understood by every simulation engine.

use num_complex::Complex64;
use serde_json::Value;

use crate::error::{IrError, IrResult};

/// A gate with concrete parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    // Single-qubit fixed gates
    /// Identity gate.
    I,
    /// Pauli-X gate.
    X,
    /// Pauli-Y gate.
    Y,
    /// Pauli-Z gate.
    Z,
    /// Hadamard gate.
    H,
    /// S gate (sqrt(Z)).
    S,
    /// S-dagger gate.
    Sdg,
    /// T gate (fourth root of Z).
    T,
    /// T-dagger gate.
    Tdg,
    /// sqrt(X) gate.
    SX,
    /// sqrt(X)-dagger gate.
    SXdg,

    // Single-qubit rotation gates
    /// Rotation around X axis.
    Rx(f64),
    /// Rotation around Y axis.
    Ry(f64),
    /// Rotation around Z axis.
    Rz(f64),
    /// Phase gate.
    P(f64),
    /// Universal single-qubit gate U(θ, φ, λ).
    U(f64, f64, f64),

    // Two-qubit gates
    /// Controlled-X (CNOT) gate.
    CX,
    /// Controlled-Y gate.
    CY,
    /// Controlled-Z gate.
    CZ,
    /// Controlled-Hadamard gate.
    CH,
    /// SWAP gate.
    Swap,
    /// Echoed cross-resonance gate.
    ECR,
    /// Controlled rotation around X.
    CRx(f64),
    /// Controlled rotation around Y.
    CRy(f64),
    /// Controlled rotation around Z.
    CRz(f64),
    /// Controlled phase gate.
    CP(f64),

    /// Arbitrary 2x2 or 4x4 unitary, row-major.
    Unitary(Vec<Vec<Complex64>>),
}

impl Gate {
    /// Get the name of this gate.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Gate::I => "id",
            Gate::X => "x",
            Gate::Y => "y",
            Gate::Z => "z",
            Gate::H => "h",
            Gate::S => "s",
            Gate::Sdg => "sdg",
            Gate::T => "t",
            Gate::Tdg => "tdg",
            Gate::SX => "sx",
            Gate::SXdg => "sxdg",
            Gate::Rx(_) => "rx",
            Gate::Ry(_) => "ry",
            Gate::Rz(_) => "rz",
            Gate::P(_) => "p",
            Gate::U(_, _, _) => "u",
            Gate::CX => "cx",
            Gate::CY => "cy",
            Gate::CZ => "cz",
            Gate::CH => "ch",
            Gate::Swap => "swap",
            Gate::ECR => "ecr",
            Gate::CRx(_) => "crx",
            Gate::CRy(_) => "cry",
            Gate::CRz(_) => "crz",
            Gate::CP(_) => "cp",
            Gate::Unitary(_) => "unitary",
        }
    }

    /// Get the number of qubits this gate operates on.
    #[inline]
    pub fn num_qubits(&self) -> usize {
        match self {
            Gate::CX
            | Gate::CY
            | Gate::CZ
            | Gate::CH
            | Gate::Swap
            | Gate::ECR
            | Gate::CRx(_)
            | Gate::CRy(_)
            | Gate::CRz(_)
            | Gate::CP(_) => 2,
            Gate::Unitary(m) if m.len() == 4 => 2,
            _ => 1,
        }
    }

    /// Whether the gate name denotes a gate that takes angle parameters.
    fn arity(name: &str) -> Option<usize> {
        match name {
            "id" | "x" | "y" | "z" | "h" | "s" | "sdg" | "t" | "tdg" | "sx" | "sxdg" | "cx"
            | "cy" | "cz" | "ch" | "swap" | "ecr" => Some(0),
            "rx" | "ry" | "rz" | "p" | "u1" | "crx" | "cry" | "crz" | "cp" => Some(1),
            "u" | "u3" => Some(3),
            _ => None,
        }
    }

    /// Check whether `name` is a gate name (including `unitary`).
    pub fn is_gate_name(name: &str) -> bool {
        name == "unitary" || Self::arity(name).is_some()
    }

    /// Build a gate from its name and the raw `params` value of an instruction.
    pub fn from_name(name: &str, params: Option<&Value>) -> IrResult<Self> {
        if name == "unitary" {
            let value = params.ok_or_else(|| IrError::MissingField {
                opcode: name.to_string(),
                field: "params",
            })?;
            return Ok(Gate::Unitary(parse_matrix(value)?));
        }

        let expected = Self::arity(name).ok_or_else(|| IrError::UnknownOpcode(name.to_string()))?;
        let angles = match params {
            Some(value) => parse_angles(value)?,
            None => Vec::new(),
        };
        // Fixed gates tolerate stray parameter lists.
        if expected > 0 && angles.len() != expected {
            return Err(IrError::ParameterArity {
                gate_name: name.to_string(),
                expected,
                got: angles.len(),
            });
        }

        let a = |i: usize| angles[i];
        Ok(match name {
            "id" => Gate::I,
            "x" => Gate::X,
            "y" => Gate::Y,
            "z" => Gate::Z,
            "h" => Gate::H,
            "s" => Gate::S,
            "sdg" => Gate::Sdg,
            "t" => Gate::T,
            "tdg" => Gate::Tdg,
            "sx" => Gate::SX,
            "sxdg" => Gate::SXdg,
            "rx" => Gate::Rx(a(0)),
            "ry" => Gate::Ry(a(0)),
            "rz" => Gate::Rz(a(0)),
            "p" | "u1" => Gate::P(a(0)),
            "u" | "u3" => Gate::U(a(0), a(1), a(2)),
            "cx" => Gate::CX,
            "cy" => Gate::CY,
            "cz" => Gate::CZ,
            "ch" => Gate::CH,
            "swap" => Gate::Swap,
            "ecr" => Gate::ECR,
            "crx" => Gate::CRx(a(0)),
            "cry" => Gate::CRy(a(0)),
            "crz" => Gate::CRz(a(0)),
            "cp" => Gate::CP(a(0)),
            _ => return Err(IrError::UnknownOpcode(name.to_string())),
        })
    }

    /// Mutable access to the angle parameters, in declaration order.
    pub fn angles_mut(&mut self) -> Vec<&mut f64> {
        match self {
            Gate::Rx(t)
            | Gate::Ry(t)
            | Gate::Rz(t)
            | Gate::P(t)
            | Gate::CRx(t)
            | Gate::CRy(t)
            | Gate::CRz(t)
            | Gate::CP(t) => vec![t],
            Gate::U(theta, phi, lambda) => vec![theta, phi, lambda],
            _ => vec![],
        }
    }

    /// Angle parameters, in declaration order.
    pub fn angles(&self) -> Vec<f64> {
        match self {
            Gate::Rx(t)
            | Gate::Ry(t)
            | Gate::Rz(t)
            | Gate::P(t)
            | Gate::CRx(t)
            | Gate::CRy(t)
            | Gate::CRz(t)
            | Gate::CP(t) => vec![*t],
            Gate::U(theta, phi, lambda) => vec![*theta, *phi, *lambda],
            _ => vec![],
        }
    }
}

fn parse_angles(value: &Value) -> IrResult<Vec<f64>> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Null => return Ok(Vec::new()),
        other => std::slice::from_ref(other),
    };
    items
        .iter()
        .map(|item| match item {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| IrError::UnboundParameter(n.to_string())),
            Value::String(s) => Err(IrError::UnboundParameter(s.clone())),
            other => Err(IrError::UnboundParameter(other.to_string())),
        })
        .collect()
}

fn parse_matrix(value: &Value) -> IrResult<Vec<Vec<Complex64>>> {
    let rows: Vec<Vec<[f64; 2]>> = serde_json::from_value(value.clone())?;
    let dim = rows.len();
    if dim != 2 && dim != 4 {
        return Err(IrError::InvalidUnitary {
            rows: dim,
            cols: rows.first().map_or(0, Vec::len),
        });
    }
    if let Some(bad) = rows.iter().find(|row| row.len() != dim) {
        return Err(IrError::InvalidUnitary {
            rows: dim,
            cols: bad.len(),
        });
    }
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(|[re, im]| Complex64::new(re, im)).collect())
        .collect())
}
