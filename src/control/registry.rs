use std::{mem, sync::Arc};

use super::{Description, Flags, Kind, MenuItem, Type};
use crate::error::{ControlError, Result};
use crate::v4l_sys::*;
use crate::Device;

/// Queries and adjusts the controls of a device
///
/// Registries are cheap to clone and may be used from any thread, also while another thread
/// is capturing from the same device.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use v4l_capture::{control, Device};
///
/// if let Ok(dev) = Device::new(0) {
///     let controls = control::Registry::new(Arc::new(dev));
///     for ctrl in controls.enumerate().flatten() {
///         print!("{}", ctrl);
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Registry {
    device: Arc<Device>,
}

impl Registry {
    /// Returns a registry issuing its requests through `device`
    pub fn new(device: Arc<Device>) -> Self {
        Registry { device }
    }

    /// Returns an iterator over the controls the driver exposes
    ///
    /// Each step issues one query, so the driver is only asked for as many controls as are
    /// consumed. Every call starts over at the first control.
    pub fn enumerate(&self) -> Controls {
        Controls {
            registry: self.clone(),
            next: 0,
            done: false,
        }
    }

    /// Returns the description of a single control
    pub fn describe(&self, id: u32) -> Result<Description> {
        let mut query = v4l2_query_ext_ctrl {
            id,
            ..unsafe { mem::zeroed() }
        };
        self.device
            .request(|driver| driver.query_ext_ctrl(&mut query))?
            .map_err(|e| ControlError::from_io(id, e))?;

        let mut desc = Description::from_query(&query).ok_or(ControlError::NotSupported(id))?;
        self.query_menu(&mut desc)?;
        Ok(desc)
    }

    /// Returns the current value of a control
    pub fn get_value(&self, id: u32) -> Result<i64> {
        let mut ctrl = v4l2_control {
            id,
            ..unsafe { mem::zeroed() }
        };
        self.device
            .request(|driver| driver.get_control(&mut ctrl))?
            .map_err(|e| ControlError::from_get(id, e))?;

        Ok(i64::from(ctrl.value))
    }

    /// Modifies the value of a control
    ///
    /// The value is checked against the control's current description first; values outside
    /// the range, off the step grid or naming no menu item are never sent to the driver.
    pub fn set_value(&self, id: u32, value: i64) -> Result<()> {
        let desc = self.describe(id)?;
        if !desc.is_writable() {
            return Err(ControlError::ReadOnly(id).into());
        }
        desc.validate(value)?;

        // every kind we model is bounded by the driver's 32 bit range
        let value = i32::try_from(value).map_err(|_| ControlError::ValueOutOfRange {
            id,
            value,
            min: desc.minimum(),
            max: desc.maximum(),
            step: desc.step(),
        })?;

        let mut ctrl = v4l2_control { id, value };
        self.device
            .request(|driver| driver.set_control(&mut ctrl))?
            .map_err(|e| ControlError::from_set(id, e))?;

        tracing::debug!(id = format_args!("{:#010x}", id), value, "set control");
        Ok(())
    }

    /// Fills in the items of a menu control, skipping indices the driver does not support
    fn query_menu(&self, desc: &mut Description) -> Result<()> {
        let (minimum, maximum, items) = match &mut desc.kind {
            Kind::Menu {
                minimum,
                maximum,
                items,
            } => (*minimum, *maximum, items),
            _ => return Ok(()),
        };

        let first = u32::try_from(minimum.max(0)).unwrap_or(0);
        let last = u32::try_from(maximum.max(0)).unwrap_or(u32::MAX);
        for index in first..=last {
            let mut item = v4l2_querymenu {
                id: desc.id,
                index,
                ..unsafe { mem::zeroed() }
            };
            match self.device.request(|driver| driver.query_menu(&mut item))? {
                Ok(()) => {
                    if let Some(item) = MenuItem::from_query(desc.typ, item) {
                        items.push((index, item));
                    }
                }
                Err(e) => {
                    tracing::trace!(id = desc.id, index, error = %e, "skipping menu item");
                }
            }
        }

        Ok(())
    }
}

/// Lazy iterator over the controls of a device, see [`Registry::enumerate`]
#[derive(Debug)]
pub struct Controls {
    registry: Registry,
    next: u32,
    done: bool,
}

impl Iterator for Controls {
    type Item = Result<Description>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let mut query = v4l2_query_ext_ctrl {
                id: self.next | Flags::NEXT_CTRL.bits(),
                ..unsafe { mem::zeroed() }
            };

            let res = match self
                .registry
                .device
                .request(|driver| driver.query_ext_ctrl(&mut query))
            {
                Ok(res) => res,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };

            match res {
                Ok(()) if query.id <= self.next => {
                    tracing::warn!(
                        id = query.id,
                        after = self.next,
                        "driver did not advance, ending control enumeration"
                    );
                    self.done = true;
                    return None;
                }
                Ok(()) => self.next = query.id,
                // the driver signals the end of the list with EINVAL
                Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(ControlError::from_io(self.next, e).into()));
                }
            }

            if Flags::from(query.flags).contains(Flags::DISABLED) {
                tracing::debug!(id = query.id, "skipping disabled control");
                continue;
            }

            let mut desc = match Description::from_query(&query) {
                Some(desc) => desc,
                None => {
                    if Type::from(query.type_) != Type::CtrlClass {
                        tracing::debug!(
                            id = query.id,
                            typ = %Type::from(query.type_),
                            "skipping control of unsupported type"
                        );
                    }
                    continue;
                }
            };

            if let Err(e) = self.registry.query_menu(&mut desc) {
                self.done = true;
                return Some(Err(e));
            }
            return Some(Ok(desc));
        }

        None
    }
}
