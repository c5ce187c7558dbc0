// Copyright 2026 ModKit Contributors

//! `ExportDescriptor` and the data it carries (spec.md §3, wire-compatible).

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Linkage of a static symbol export. Only `Global` is accepted by
/// [`crate::validator::ExportValidator`] (spec.md §4.2 rule 6); the
/// enum still models `Local` so descriptors that declare it are rejected
/// with a specific reason rather than silently coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    Global,
    Local,
}

/// An imported namespace declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceImport {
    pub namespace: String,
}

/// An imported symbol declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolImport {
    pub name: String,
    pub namespace: String,
    pub version: Version,
}

/// A statically-known symbol export, with an opaque pointer-sized payload
/// standing in for the ABI's `symbol_ptr` (spec.md §3). This engine never
/// dereferences it; it is opaque data handed back to the instance layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolExport {
    pub name: String,
    pub namespace: String,
    pub version: Version,
    pub linkage: Linkage,
    #[serde(default)]
    pub symbol_ptr: u64,
}

/// A symbol export whose constructor/destructor run during instance
/// construction/teardown (spec.md §4.5.3 S1, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicSymbolExport {
    pub name: String,
    pub namespace: String,
    pub version: Version,
    pub linkage: Linkage,
    /// Opaque identifier for the constructor the instance layer should run.
    pub constructor: String,
    /// Opaque identifier for the matching destructor.
    pub destructor: String,
}

/// A module parameter declaration (spec.md §6/§10's `query_parameter`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Bool,
}

impl ParameterType {
    pub fn name(&self) -> &'static str {
        match self {
            ParameterType::U8 => "u8",
            ParameterType::U16 => "u16",
            ParameterType::U32 => "u32",
            ParameterType::U64 => "u64",
            ParameterType::I8 => "i8",
            ParameterType::I16 => "i16",
            ParameterType::I32 => "i32",
            ParameterType::I64 => "i64",
            ParameterType::Bool => "bool",
        }
    }
}

/// Who may read/write a parameter from outside its owning instance
/// (spec.md §10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessGroup {
    /// Only the owning instance itself.
    Private,
    /// The owning instance and its declared dependents.
    Dependency,
    /// Any caller.
    Public,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDeclaration {
    pub name: String,
    pub ty: ParameterType,
    pub read_group: AccessGroup,
    pub write_group: AccessGroup,
    pub default: ParameterValue,
}

/// A typed parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Bool(bool),
}

impl ParameterValue {
    pub fn ty(&self) -> ParameterType {
        match self {
            ParameterValue::U8(_) => ParameterType::U8,
            ParameterValue::U16(_) => ParameterType::U16,
            ParameterValue::U32(_) => ParameterType::U32,
            ParameterValue::U64(_) => ParameterType::U64,
            ParameterValue::I8(_) => ParameterType::I8,
            ParameterValue::I16(_) => ParameterType::I16,
            ParameterValue::I32(_) => ParameterType::I32,
            ParameterValue::I64(_) => ParameterType::I64,
            ParameterValue::Bool(_) => ParameterType::Bool,
        }
    }
}

/// A resource the instance expects to be granted by the "worlds" layer.
/// Opaque to this engine beyond its declared name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    pub name: String,
}

/// A modifier tag (spec.md §4.2 rule 7). `Dependency` additionally names the
/// instance it depends on (spec.md §4.5.5 step 4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modifier {
    DebugInfo,
    InstanceState,
    StartEvent,
    StopEvent,
    Dependency { instance: String },
}

impl Modifier {
    /// Tag identity used for the "at most once" rule. `Dependency` modifiers
    /// may repeat (once per named instance); the other four may not.
    fn tag(&self) -> &'static str {
        match self {
            Modifier::DebugInfo => "debug_info",
            Modifier::InstanceState => "instance_state",
            Modifier::StartEvent => "start_event",
            Modifier::StopEvent => "stop_event",
            Modifier::Dependency { .. } => "dependency",
        }
    }

    pub fn is_singleton_tag(&self) -> bool {
        !matches!(self, Modifier::Dependency { .. })
    }
}

/// Immutable module metadata supplied by a caller, as described in spec.md §3.
///
/// `next` is modeled implicitly: this type has no successor-pointer field at
/// all (there is nothing in safe Rust that would let a caller smuggle one
/// in), which trivially satisfies validator rule 1 ("`next` pointer is
/// null"). See [`crate::validator::ExportValidator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    pub context_version: Version,
    #[serde(default)]
    pub namespace_imports: Vec<NamespaceImport>,
    #[serde(default)]
    pub symbol_imports: Vec<SymbolImport>,
    #[serde(default)]
    pub symbol_exports: Vec<SymbolExport>,
    #[serde(default)]
    pub dynamic_symbol_exports: Vec<DynamicSymbolExport>,
    #[serde(default)]
    pub parameters: Vec<ParameterDeclaration>,
    #[serde(default)]
    pub resources: Vec<ResourceDeclaration>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
}

impl ExportDescriptor {
    /// A minimal, bare export descriptor named `name` with no imports or
    /// exports, for tests and simple bootstrap modules.
    pub fn bare(name: impl Into<String>, context_version: Version) -> Self {
        ExportDescriptor {
            name: name.into(),
            description: None,
            author: None,
            license: None,
            context_version,
            namespace_imports: Vec::new(),
            symbol_imports: Vec::new(),
            symbol_exports: Vec::new(),
            dynamic_symbol_exports: Vec::new(),
            parameters: Vec::new(),
            resources: Vec::new(),
            modifiers: Vec::new(),
        }
    }

    pub fn modifier_tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.modifiers.iter().map(Modifier::tag)
    }
}
