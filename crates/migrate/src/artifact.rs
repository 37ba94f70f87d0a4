//! Compiled contract artifacts and their resolution.

use std::path::PathBuf;

use alloy_core::dyn_abi::DynSolType;
use alloy_core::primitives::Bytes;
use serde_json::Value;

use crate::MigrateError;

/// A compiled contract artifact: creation bytecode plus ABI.
///
/// Immutable once resolved. The constructor parameter types are parsed out of
/// the ABI up front so argument checking can happen before any transaction is
/// built.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Logical contract name.
    pub name: String,
    /// Creation (init) bytecode, without constructor arguments.
    pub bytecode: Bytes,
    /// Full ABI as emitted by the compiler.
    pub abi: Value,
    /// Constructor parameter types, in declaration order.
    pub constructor: Vec<DynSolType>,
}

impl Artifact {
    /// Parse an artifact from compiler output JSON (Hardhat/Foundry layout).
    ///
    /// Accepts both `"bytecode": "0x..."` and the nested
    /// `"bytecode": { "object": "0x..." }` form.
    pub fn from_json(name: &str, json: &Value) -> Result<Self, MigrateError> {
        let invalid = |reason: String| MigrateError::InvalidArtifact {
            name: name.to_owned(),
            reason,
        };

        let raw_bytecode = json
            .get("bytecode")
            .and_then(|b| b.as_str().or_else(|| b.get("object")?.as_str()))
            .ok_or_else(|| invalid("missing bytecode".into()))?;

        let bytecode: Bytes = raw_bytecode
            .parse()
            .map_err(|e| invalid(format!("bad bytecode hex: {e}")))?;

        if bytecode.is_empty() {
            return Err(invalid(
                "empty bytecode (abstract contract or interface?)".into(),
            ));
        }

        let entries = json
            .get("abi")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("missing abi".into()))?;

        let constructor = constructor_params(entries).map_err(invalid)?;

        Ok(Self {
            name: name.to_owned(),
            bytecode,
            abi: Value::Array(entries.clone()),
            constructor,
        })
    }
}

/// Extract the constructor parameter types from an ABI array.
///
/// A contract without an explicit constructor has no constructor entry in its
/// ABI; that is a zero-argument constructor.
fn constructor_params(entries: &[Value]) -> Result<Vec<DynSolType>, String> {
    let Some(ctor) = entries
        .iter()
        .find(|e| e.get("type").and_then(Value::as_str) == Some("constructor"))
    else {
        return Ok(Vec::new());
    };

    let inputs = ctor
        .get("inputs")
        .and_then(Value::as_array)
        .ok_or("constructor without inputs array")?;

    inputs.iter().map(param_type).collect()
}

/// Resolve one ABI parameter descriptor to a [`DynSolType`].
///
/// Tuples are spelled `"tuple"` (plus array suffixes) in the ABI with the
/// element types under `"components"`, so they need structural recursion;
/// everything else parses straight from the type string.
fn param_type(input: &Value) -> Result<DynSolType, String> {
    let ty = input
        .get("type")
        .and_then(Value::as_str)
        .ok_or("parameter without a type")?;

    if let Some(suffix) = ty.strip_prefix("tuple") {
        let components = input
            .get("components")
            .and_then(Value::as_array)
            .ok_or_else(|| format!("{ty} parameter without components"))?;
        let inner = DynSolType::Tuple(
            components
                .iter()
                .map(param_type)
                .collect::<Result<Vec<_>, _>>()?,
        );
        wrap_arrays(inner, suffix)
    } else {
        ty.parse::<DynSolType>().map_err(|e| e.to_string())
    }
}

/// Apply array suffixes (`[]`, `[3]`, `[2][]`, ...) to an element type.
fn wrap_arrays(mut ty: DynSolType, suffix: &str) -> Result<DynSolType, String> {
    let mut rest = suffix;
    while !rest.is_empty() {
        let end = rest
            .find(']')
            .filter(|_| rest.starts_with('['))
            .ok_or_else(|| format!("malformed array suffix: {suffix}"))?;
        let dim = &rest[1..end];
        ty = if dim.is_empty() {
            DynSolType::Array(Box::new(ty))
        } else {
            let len: usize = dim
                .parse()
                .map_err(|_| format!("malformed array length: {dim}"))?;
            DynSolType::FixedArray(Box::new(ty), len)
        };
        rest = &rest[end + 1..];
    }
    Ok(ty)
}

/// Resolves a logical contract name to a compiled [`Artifact`].
///
/// Any component able to supply (bytecode, ABI, constructor signature) for a
/// name satisfies this capability.
pub trait ArtifactSource: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Artifact, MigrateError>;
}

/// Artifact source reading `<dir>/<Name>.json` compiler output files.
#[derive(Debug, Clone)]
pub struct DirArtifactSource {
    dir: PathBuf,
}

impl DirArtifactSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArtifactSource for DirArtifactSource {
    fn resolve(&self, name: &str) -> Result<Artifact, MigrateError> {
        let path = self.dir.join(format!("{name}.json"));
        if !path.exists() {
            return Err(MigrateError::ArtifactNotFound(name.to_owned()));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| MigrateError::InvalidArtifact {
            name: name.to_owned(),
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        let json: Value =
            serde_json::from_str(&content).map_err(|e| MigrateError::InvalidArtifact {
                name: name.to_owned(),
                reason: format!("failed to parse {}: {e}", path.display()),
            })?;

        tracing::debug!(contract = name, path = %path.display(), "artifact resolved");
        Artifact::from_json(name, &json)
    }
}
