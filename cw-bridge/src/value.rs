use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::closure::ClosureHandle;

/// The host side's closed value model. Everything that can cross the
/// boundary is one of these variants; `Object` and `Closure` are the
/// identity-carrying catch-alls that travel as reference-table handles.
#[derive(Clone, Debug, PartialEq)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Int(i32),
    Float(f64),
    Text(String),
    List(Vec<HostValue>),
    Map(Vec<(String, HostValue)>),
    Object(HostObject),
    Token(UniqueToken),
    Closure(ClosureHandle),
    View(TypedView),
}

impl HostValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "float",
            HostValue::Text(_) => "text",
            HostValue::List(_) => "list",
            HostValue::Map(_) => "map",
            HostValue::Object(_) => "object",
            HostValue::Token(_) => "token",
            HostValue::Closure(_) => "closure",
            HostValue::View(_) => "view",
        }
    }

    // Pointer identity for the variants that have one; `None` means the
    // reference table must fall back to equality matching.
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            HostValue::Object(object) => Some(object.identity()),
            HostValue::Token(token) => Some(token.identity()),
            HostValue::Closure(closure) => Some(closure.identity()),
            _ => None,
        }
    }
}

/// An opaque host object. Clones share identity; equality is identity.
#[derive(Clone)]
pub struct HostObject {
    inner: Rc<dyn Any>,
}

impl HostObject {
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            inner: Rc::new(value),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for HostObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({:#x})", self.identity())
    }
}

#[derive(Debug)]
struct TokenData {
    label: Option<String>,
}

/// An identity-only marker value. Tokens are never deduplicated by the
/// codec: each crossing registers a fresh raw id.
#[derive(Clone)]
pub struct UniqueToken {
    inner: Rc<TokenData>,
}

impl UniqueToken {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(TokenData { label: None }),
        }
    }

    pub fn labeled(label: &str) -> Self {
        Self {
            inner: Rc::new(TokenData {
                label: Some(label.to_string()),
            }),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

impl Default for UniqueToken {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for UniqueToken {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for UniqueToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => write!(f, "UniqueToken({label:?})"),
            None => write!(f, "UniqueToken({:#x})", self.identity()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ElementKind {
    U8 = 0,
    I8 = 1,
    U16 = 2,
    I16 = 3,
    U32 = 4,
    I32 = 5,
    F32 = 6,
    F64 = 7,
}

impl ElementKind {
    pub fn from_raw(raw: u32) -> Option<ElementKind> {
        match raw {
            0 => Some(ElementKind::U8),
            1 => Some(ElementKind::I8),
            2 => Some(ElementKind::U16),
            3 => Some(ElementKind::I16),
            4 => Some(ElementKind::U32),
            5 => Some(ElementKind::I32),
            6 => Some(ElementKind::F32),
            7 => Some(ElementKind::F64),
            _ => None,
        }
    }

    pub fn width(self) -> u32 {
        match self {
            ElementKind::U8 | ElementKind::I8 => 1,
            ElementKind::U16 | ElementKind::I16 => 2,
            ElementKind::U32 | ElementKind::I32 | ElementKind::F32 => 4,
            ElementKind::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::U8 => "u8",
            ElementKind::I8 => "i8",
            ElementKind::U16 => "u16",
            ElementKind::I16 => "i16",
            ElementKind::U32 => "u32",
            ElementKind::I32 => "i32",
            ElementKind::F32 => "f32",
            ElementKind::F64 => "f64",
        }
    }
}

/// A typed window into guest memory. The descriptor owns nothing; it is
/// only valid while the arena blocks of the producing call are alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypedView {
    pub address: u32,
    pub length: u32,
    pub element: ElementKind,
}

impl TypedView {
    pub fn byte_length(&self) -> Option<u32> {
        self.length.checked_mul(self.element.width())
    }
}
