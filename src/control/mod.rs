use std::fmt;

use crate::error::ControlError;
use crate::v4l2;
use crate::v4l_sys::*;

pub mod id;

mod registry;
pub use registry::{Controls, Registry};

/// Control data type as reported by the driver
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Type {
    Integer,
    Boolean,
    Menu,
    Button,
    Integer64,
    CtrlClass,
    String,
    Bitmask,
    IntegerMenu,

    Unknown(u32),
}

impl From<u32> for Type {
    fn from(repr: u32) -> Self {
        match repr {
            1 => Self::Integer,
            2 => Self::Boolean,
            3 => Self::Menu,
            4 => Self::Button,
            5 => Self::Integer64,
            6 => Self::CtrlClass,
            7 => Self::String,
            8 => Self::Bitmask,
            9 => Self::IntegerMenu,
            repr => Self::Unknown(repr),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

bitflags::bitflags! {
    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
    pub struct Flags: u32 {
        const DISABLED              = 0x0001;
        const GRABBED               = 0x0002;
        const READ_ONLY             = 0x0004;
        const UPDATE                = 0x0008;
        const INACTIVE              = 0x0010;
        const SLIDER                = 0x0020;
        const WRITE_ONLY            = 0x0040;
        const VOLATILE              = 0x0080;
        const HAS_PAYLOAD           = 0x0100;
        const EXECUTE_ON_WRITE      = 0x0200;
        const MODIFY_LAYOUT         = 0x0400;

        const NEXT_CTRL             = 0x80000000;
        const NEXT_COMPOUND         = 0x40000000;
    }
}

impl From<u32> for Flags {
    fn from(flags: u32) -> Self {
        Self::from_bits_retain(flags)
    }
}

impl From<Flags> for u32 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Device control menu item
pub enum MenuItem {
    Name(String),
    Value(i64),
}

impl MenuItem {
    /// Decodes a VIDIOC_QUERYMENU answer for a menu of the given type
    pub(crate) fn from_query(typ: Type, item: v4l2_querymenu) -> Option<Self> {
        match typ {
            Type::Menu => {
                // copy out of the packed struct before borrowing
                let name = unsafe { item.__bindgen_anon_1.name };
                Some(MenuItem::Name(v4l2::string_from_bytes(&name)))
            }
            Type::IntegerMenu => Some(MenuItem::Value(unsafe { item.__bindgen_anon_1.value })),
            _ => None,
        }
    }
}

impl fmt::Display for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MenuItem::Name(name) => write!(f, "{}", name),
            MenuItem::Value(value) => write!(f, "{}", value),
        }
    }
}

/// Value domain of a control
///
/// Only controls whose value is a single integer that fits VIDIOC_S_CTRL are modelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// 0 or 1
    Boolean,
    /// Integer in `[minimum, maximum]` on a `step` grid anchored at `minimum`
    Integer { minimum: i64, maximum: i64, step: u64 },
    /// Index of one of the items the driver reported
    Menu {
        minimum: i64,
        maximum: i64,
        items: Vec<(u32, MenuItem)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Device control description
pub struct Description {
    /// Control identifier, see [`id`]
    pub id: u32,
    /// Name of the control, intended for the user
    pub name: String,
    /// Type as reported by the driver
    pub typ: Type,
    /// Value domain
    pub kind: Kind,
    /// Default value
    pub default: i64,
    /// Control flags
    pub flags: Flags,
}

impl Description {
    /// Builds a description from a VIDIOC_QUERY_EXT_CTRL answer
    ///
    /// Returns `None` for types outside [`Kind`] (buttons, strings, 64 bit and compound
    /// controls, control classes). Menu items are left empty for the caller to fill in.
    pub(crate) fn from_query(ctrl: &v4l2_query_ext_ctrl) -> Option<Self> {
        let typ = Type::from(ctrl.type_);
        let kind = match typ {
            Type::Boolean => Kind::Boolean,
            Type::Integer => Kind::Integer {
                minimum: ctrl.minimum,
                maximum: ctrl.maximum,
                step: ctrl.step.max(1),
            },
            Type::Menu | Type::IntegerMenu => Kind::Menu {
                minimum: ctrl.minimum,
                maximum: ctrl.maximum,
                items: Vec::new(),
            },
            _ => return None,
        };

        let name: Vec<u8> = ctrl.name.iter().map(|&c| c as u8).collect();
        Some(Description {
            id: ctrl.id,
            name: v4l2::string_from_bytes(&name),
            typ,
            kind,
            default: ctrl.default_value,
            flags: Flags::from(ctrl.flags),
        })
    }

    /// Minimum value, inclusive
    pub fn minimum(&self) -> i64 {
        match &self.kind {
            Kind::Boolean => 0,
            Kind::Integer { minimum, .. } | Kind::Menu { minimum, .. } => *minimum,
        }
    }

    /// Maximum value, inclusive
    pub fn maximum(&self) -> i64 {
        match &self.kind {
            Kind::Boolean => 1,
            Kind::Integer { maximum, .. } | Kind::Menu { maximum, .. } => *maximum,
        }
    }

    /// Step size, always positive
    pub fn step(&self) -> u64 {
        match &self.kind {
            Kind::Integer { step, .. } => *step,
            Kind::Boolean | Kind::Menu { .. } => 1,
        }
    }

    /// Whether values can be written
    pub fn is_writable(&self) -> bool {
        !self.flags.contains(Flags::READ_ONLY)
    }

    /// Whether the value may change without being written, e.g. under automatic exposure
    pub fn is_volatile(&self) -> bool {
        self.flags.contains(Flags::VOLATILE)
    }

    /// Checks a value against the control's domain
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::control::{Description, Flags, Kind, Type};
    ///
    /// let brightness = Description {
    ///     id: v4l_capture::control::id::BRIGHTNESS,
    ///     name: "Brightness".to_string(),
    ///     typ: Type::Integer,
    ///     kind: Kind::Integer { minimum: 0, maximum: 255, step: 1 },
    ///     default: 128,
    ///     flags: Flags::empty(),
    /// };
    /// assert!(brightness.validate(48).is_ok());
    /// assert!(brightness.validate(9999).is_err());
    /// ```
    pub fn validate(&self, value: i64) -> Result<(), ControlError> {
        let valid = match &self.kind {
            Kind::Boolean => value == 0 || value == 1,
            Kind::Integer {
                minimum,
                maximum,
                step,
            } => {
                value >= *minimum
                    && value <= *maximum
                    && (value as i128 - *minimum as i128) % (*step as i128) == 0
            }
            Kind::Menu { items, .. } => items.iter().any(|(index, _)| *index as i64 == value),
        };

        if valid {
            Ok(())
        } else {
            Err(ControlError::ValueOutOfRange {
                id: self.id,
                value,
                min: self.minimum(),
                max: self.maximum(),
                step: self.step(),
            })
        }
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ID         : {:#010x}", self.id)?;
        writeln!(f, "Type       : {}", self.typ)?;
        writeln!(f, "Name       : {}", self.name)?;
        writeln!(f, "Minimum    : {}", self.minimum())?;
        writeln!(f, "Maximum    : {}", self.maximum())?;
        writeln!(f, "Step       : {}", self.step())?;
        writeln!(f, "Default    : {}", self.default)?;
        writeln!(f, "Flags      : {}", self.flags)?;
        if let Kind::Menu { items, .. } = &self.kind {
            writeln!(f, "Menu ==>")?;
            for (index, item) in items {
                writeln!(f, " * {}: {}", index, item)?;
            }
        }
        Ok(())
    }
}
