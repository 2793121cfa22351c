//! Micheline expressions
//!
//! Structured contract code and storage as exchanged with the node. Script
//! well-formedness is delegated to a [`MichelsonOracle`]; this module only
//! carries the data model and the oracle seam.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A Michelson well-formedness failure reported by the oracle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MichelsonError(pub String);

/// A Micheline expression node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MichelineExpr {
    /// A sequence of expressions
    Seq(Vec<MichelineExpr>),
    /// A primitive application with optional arguments and annotations
    Prim {
        prim: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<MichelineExpr>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        annots: Vec<String>,
    },
    /// An integer literal, kept as a string to preserve arbitrary precision
    Int { int: String },
    /// A string literal
    Str { string: String },
    /// A bytes literal as hex
    Bytes { bytes: String },
}

impl MichelineExpr {
    /// Bare primitive with no arguments
    pub fn prim(name: &str) -> Self {
        MichelineExpr::Prim {
            prim: name.to_string(),
            args: Vec::new(),
            annots: Vec::new(),
        }
    }

    /// Integer literal
    pub fn int(value: i64) -> Self {
        MichelineExpr::Int {
            int: value.to_string(),
        }
    }
}

/// Pass/fail oracle for script well-formedness, plus a display renderer.
/// The parser and type checker behind it are external concerns.
pub trait MichelsonOracle: Send + Sync {
    /// Assert that an expression is a well-formed contract
    fn assert_contract(&self, code: &MichelineExpr) -> Result<(), MichelsonError>;

    /// Assert that an expression is well-formed Michelson data
    fn assert_data(&self, data: &MichelineExpr) -> Result<(), MichelsonError>;

    /// Render an expression for display
    fn render(&self, expr: &MichelineExpr) -> String {
        serde_json::to_string_pretty(expr).unwrap_or_default()
    }
}

/// In-memory oracle for tests: accepts everything, or rejects everything
/// with a fixed message
#[derive(Default)]
pub struct PermissiveMichelson {
    reject: Option<String>,
}

impl PermissiveMichelson {
    /// Oracle that accepts any expression
    pub fn new() -> Self {
        Self::default()
    }

    /// Oracle that rejects any expression with the given message
    pub fn rejecting(message: &str) -> Self {
        Self {
            reject: Some(message.to_string()),
        }
    }
}

impl MichelsonOracle for PermissiveMichelson {
    fn assert_contract(&self, _code: &MichelineExpr) -> Result<(), MichelsonError> {
        match &self.reject {
            Some(msg) => Err(MichelsonError(msg.clone())),
            None => Ok(()),
        }
    }

    fn assert_data(&self, _data: &MichelineExpr) -> Result<(), MichelsonError> {
        match &self.reject {
            Some(msg) => Err(MichelsonError(msg.clone())),
            None => Ok(()),
        }
    }
}
