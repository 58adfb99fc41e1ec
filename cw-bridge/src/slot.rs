use crate::arena;
use crate::bridge::{Bridge, BridgeError, BridgeResult};
use crate::closure::{ClosureHandle, ClosureVariant};
use crate::guest::GuestRuntime;
use crate::value::{ElementKind, HostValue, TypedView};

pub const SLOT_SIZE: u32 = 16;
pub const KIND_OFFSET: u32 = 12;

const KEY_PAIR_SIZE: u32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    Undefined = 0,
    Null = 1,
    Int = 2,
    Float = 3,
    Text = 4,
    False = 5,
    True = 6,
    List = 7,
    Map = 8,
    Reference = 9,
    SharedClosure = 10,
    ExclusiveClosure = 12,
    OnceClosure = 13,
    View = 14,
    Raw = 15,
}

impl Kind {
    pub fn from_byte(byte: u8) -> Option<Kind> {
        match byte {
            0 => Some(Kind::Undefined),
            1 => Some(Kind::Null),
            2 => Some(Kind::Int),
            3 => Some(Kind::Float),
            4 => Some(Kind::Text),
            5 => Some(Kind::False),
            6 => Some(Kind::True),
            7 => Some(Kind::List),
            8 => Some(Kind::Map),
            9 => Some(Kind::Reference),
            10 => Some(Kind::SharedClosure),
            12 => Some(Kind::ExclusiveClosure),
            13 => Some(Kind::OnceClosure),
            14 => Some(Kind::View),
            15 => Some(Kind::Raw),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Undefined => "undefined",
            Kind::Null => "null",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Text => "text",
            Kind::False => "false",
            Kind::True => "true",
            Kind::List => "list",
            Kind::Map => "map",
            Kind::Reference => "reference",
            Kind::SharedClosure => "shared closure",
            Kind::ExclusiveClosure => "exclusive closure",
            Kind::OnceClosure => "once closure",
            Kind::View => "view",
            Kind::Raw => "raw",
        }
    }
}

fn offset(address: u32, delta: u32) -> BridgeResult<u32> {
    address.checked_add(delta).ok_or(BridgeError::OutOfBounds {
        address,
        length: delta,
    })
}

pub fn decode(
    bridge: &mut Bridge,
    guest: &dyn GuestRuntime,
    address: u32,
) -> BridgeResult<HostValue> {
    let kind_byte = bridge
        .views
        .views(guest.memory())
        .read_u8(offset(address, KIND_OFFSET)?)?;
    let kind = Kind::from_byte(kind_byte).ok_or(BridgeError::UnknownKind(kind_byte))?;

    match kind {
        Kind::Undefined => Ok(HostValue::Undefined),
        Kind::Null => Ok(HostValue::Null),
        Kind::False => Ok(HostValue::Bool(false)),
        Kind::True => Ok(HostValue::Bool(true)),
        Kind::Int => {
            let value = bridge.views.views(guest.memory()).read_i32(address)?;
            Ok(HostValue::Int(value))
        }
        Kind::Float => {
            let value = bridge.views.views(guest.memory()).read_f64(address)?;
            Ok(HostValue::Float(value))
        }
        Kind::Text => {
            let (pointer, length) = {
                let views = bridge.views.views(guest.memory());
                (views.read_u32(address)?, views.read_u32(offset(address, 4)?)?)
            };
            Ok(HostValue::Text(read_text(bridge, guest, pointer, length)?))
        }
        Kind::List => {
            let (pointer, length) = {
                let views = bridge.views.views(guest.memory());
                (views.read_u32(address)?, views.read_u32(offset(address, 4)?)?)
            };
            let total = length
                .checked_mul(SLOT_SIZE)
                .ok_or(BridgeError::LengthTooLarge("sequence", length as usize))?;
            bridge.views.views(guest.memory()).read_bytes(pointer, total)?;

            let mut items = Vec::with_capacity(length as usize);
            for index in 0..length {
                items.push(decode(bridge, guest, offset(pointer, index * SLOT_SIZE)?)?);
            }
            Ok(HostValue::List(items))
        }
        Kind::Map => {
            let (values_pointer, length, keys_pointer) = {
                let views = bridge.views.views(guest.memory());
                (
                    views.read_u32(address)?,
                    views.read_u32(offset(address, 4)?)?,
                    views.read_u32(offset(address, 8)?)?,
                )
            };
            let value_bytes = length
                .checked_mul(SLOT_SIZE)
                .ok_or(BridgeError::LengthTooLarge("map", length as usize))?;
            let key_bytes = length
                .checked_mul(KEY_PAIR_SIZE)
                .ok_or(BridgeError::LengthTooLarge("map", length as usize))?;
            {
                let views = bridge.views.views(guest.memory());
                views.read_bytes(values_pointer, value_bytes)?;
                views.read_bytes(keys_pointer, key_bytes)?;
            }

            let mut entries = Vec::with_capacity(length as usize);
            for index in 0..length {
                let pair = offset(keys_pointer, index * KEY_PAIR_SIZE)?;
                let (key_pointer, key_length) = {
                    let views = bridge.views.views(guest.memory());
                    (views.read_u32(pair)?, views.read_u32(offset(pair, 4)?)?)
                };
                let key = read_text(bridge, guest, key_pointer, key_length)?;
                let value = decode(bridge, guest, offset(values_pointer, index * SLOT_SIZE)?)?;
                entries.push((key, value));
            }
            Ok(HostValue::Map(entries))
        }
        Kind::Reference => {
            let id = bridge.views.views(guest.memory()).read_u32(address)?;
            if id == 0 {
                return Ok(HostValue::Undefined);
            }
            bridge.refs.lookup(id)
        }
        Kind::SharedClosure | Kind::ExclusiveClosure | Kind::OnceClosure => {
            let (adapter, function, deallocator) = {
                let views = bridge.views.views(guest.memory());
                (
                    views.read_u32(address)?,
                    views.read_u32(offset(address, 4)?)?,
                    views.read_u32(offset(address, 8)?)?,
                )
            };
            let variant = match kind {
                Kind::SharedClosure => ClosureVariant::Shared,
                Kind::ExclusiveClosure => ClosureVariant::Exclusive,
                _ => ClosureVariant::Once,
            };
            Ok(HostValue::Closure(ClosureHandle::new(
                variant,
                adapter,
                function,
                deallocator,
            )))
        }
        Kind::View => {
            let (pointer, count, raw_element) = {
                let views = bridge.views.views(guest.memory());
                (
                    views.read_u32(address)?,
                    views.read_u32(offset(address, 4)?)?,
                    views.read_u32(offset(address, 8)?)?,
                )
            };
            let element = ElementKind::from_raw(raw_element)
                .ok_or(BridgeError::UnknownElementKind(raw_element))?;
            let view = TypedView {
                address: pointer,
                length: count,
                element,
            };
            let bytes = view
                .byte_length()
                .ok_or(BridgeError::LengthTooLarge("view", count as usize))?;
            bridge.views.views(guest.memory()).read_bytes(pointer, bytes)?;
            Ok(HostValue::View(view))
        }
        Kind::Raw => {
            let id = bridge.views.views(guest.memory()).read_u32(address)?;
            bridge.raw.get(id)
        }
    }
}

pub fn encode(
    bridge: &mut Bridge,
    guest: &mut dyn GuestRuntime,
    address: u32,
    value: &HostValue,
) -> BridgeResult<()> {
    match value {
        HostValue::Undefined => write_kind(bridge, guest, address, Kind::Undefined),
        HostValue::Null => write_kind(bridge, guest, address, Kind::Null),
        HostValue::Bool(false) => write_kind(bridge, guest, address, Kind::False),
        HostValue::Bool(true) => write_kind(bridge, guest, address, Kind::True),
        HostValue::Int(value) => write_int(bridge, guest, address, *value),
        HostValue::Float(value) => {
            // integral doubles that fit i32 travel as Int, -0.0 included
            let value = *value;
            let truncated = value as i32;
            if truncated as f64 == value {
                write_int(bridge, guest, address, truncated)
            } else {
                let mut views = bridge.views.views_mut(guest.memory_mut());
                views.write_f64(address, value)?;
                views.write_u8(offset(address, KIND_OFFSET)?, Kind::Float as u8)
            }
        }
        HostValue::Text(text) => {
            let (pointer, length) = write_text(bridge, guest, text)?;
            let mut views = bridge.views.views_mut(guest.memory_mut());
            views.write_u32(address, pointer)?;
            views.write_u32(offset(address, 4)?, length)?;
            views.write_u8(offset(address, KIND_OFFSET)?, Kind::Text as u8)
        }
        HostValue::List(items) => serialize_array(bridge, guest, address, items),
        HostValue::Map(entries) => serialize_object(bridge, guest, address, entries),
        HostValue::View(view) => {
            let bytes = view
                .byte_length()
                .ok_or(BridgeError::LengthTooLarge("view", view.length as usize))?;
            bridge.views.views(guest.memory()).read_bytes(view.address, bytes)?;

            let mut views = bridge.views.views_mut(guest.memory_mut());
            views.write_u32(address, view.address)?;
            views.write_u32(offset(address, 4)?, view.length)?;
            views.write_u32(offset(address, 8)?, view.element as u32)?;
            views.write_u8(offset(address, KIND_OFFSET)?, Kind::View as u8)
        }
        HostValue::Token(_) => {
            let id = bridge.raw.register(value.clone());
            let mut views = bridge.views.views_mut(guest.memory_mut());
            views.write_u32(address, id)?;
            views.write_u8(offset(address, KIND_OFFSET)?, Kind::Raw as u8)
        }
        HostValue::Object(_) | HostValue::Closure(_) => {
            let id = bridge.refs.acquire(value);
            let mut views = bridge.views.views_mut(guest.memory_mut());
            views.write_u32(address, id)?;
            views.write_u8(offset(address, KIND_OFFSET)?, Kind::Reference as u8)
        }
    }
}

pub fn encode_new_slot(
    bridge: &mut Bridge,
    guest: &mut dyn GuestRuntime,
    value: &HostValue,
) -> BridgeResult<u32> {
    let address = arena::alloc_slot(guest)?;
    encode(bridge, guest, address, value)?;
    Ok(address)
}

pub fn serialize_array(
    bridge: &mut Bridge,
    guest: &mut dyn GuestRuntime,
    address: u32,
    items: &[HostValue],
) -> BridgeResult<()> {
    let length = u32::try_from(items.len())
        .map_err(|_| BridgeError::LengthTooLarge("sequence", items.len()))?;
    let total = length
        .checked_mul(SLOT_SIZE)
        .ok_or(BridgeError::LengthTooLarge("sequence", items.len()))?;
    let pointer = arena::alloc(guest, total)?;

    {
        let mut views = bridge.views.views_mut(guest.memory_mut());
        views.write_u8(offset(address, KIND_OFFSET)?, Kind::List as u8)?;
        views.write_u32(address, pointer)?;
        views.write_u32(offset(address, 4)?, length)?;
    }
    for (index, item) in items.iter().enumerate() {
        encode(bridge, guest, offset(pointer, index as u32 * SLOT_SIZE)?, item)?;
    }
    Ok(())
}

pub fn serialize_object(
    bridge: &mut Bridge,
    guest: &mut dyn GuestRuntime,
    address: u32,
    entries: &[(String, HostValue)],
) -> BridgeResult<()> {
    let length = u32::try_from(entries.len())
        .map_err(|_| BridgeError::LengthTooLarge("map", entries.len()))?;
    let key_total = length
        .checked_mul(KEY_PAIR_SIZE)
        .ok_or(BridgeError::LengthTooLarge("map", entries.len()))?;
    let value_total = length
        .checked_mul(SLOT_SIZE)
        .ok_or(BridgeError::LengthTooLarge("map", entries.len()))?;
    let keys_pointer = arena::alloc(guest, key_total)?;
    let values_pointer = arena::alloc(guest, value_total)?;

    {
        let mut views = bridge.views.views_mut(guest.memory_mut());
        views.write_u8(offset(address, KIND_OFFSET)?, Kind::Map as u8)?;
        views.write_u32(address, values_pointer)?;
        views.write_u32(offset(address, 4)?, length)?;
        views.write_u32(offset(address, 8)?, keys_pointer)?;
    }
    for (index, (key, value)) in entries.iter().enumerate() {
        let (text_pointer, text_length) = write_text(bridge, guest, key)?;
        let pair = offset(keys_pointer, index as u32 * KEY_PAIR_SIZE)?;
        {
            let mut views = bridge.views.views_mut(guest.memory_mut());
            views.write_u32(pair, text_pointer)?;
            views.write_u32(offset(pair, 4)?, text_length)?;
        }
        encode(
            bridge,
            guest,
            offset(values_pointer, index as u32 * SLOT_SIZE)?,
            value,
        )?;
    }
    Ok(())
}

fn write_kind(
    bridge: &mut Bridge,
    guest: &mut dyn GuestRuntime,
    address: u32,
    kind: Kind,
) -> BridgeResult<()> {
    bridge
        .views
        .views_mut(guest.memory_mut())
        .write_u8(offset(address, KIND_OFFSET)?, kind as u8)
}

fn write_int(
    bridge: &mut Bridge,
    guest: &mut dyn GuestRuntime,
    address: u32,
    value: i32,
) -> BridgeResult<()> {
    let mut views = bridge.views.views_mut(guest.memory_mut());
    views.write_i32(address, value)?;
    views.write_u8(offset(address, KIND_OFFSET)?, Kind::Int as u8)
}

fn read_text(
    bridge: &mut Bridge,
    guest: &dyn GuestRuntime,
    pointer: u32,
    length: u32,
) -> BridgeResult<String> {
    if length == 0 {
        return Ok(String::new());
    }
    let views = bridge.views.views(guest.memory());
    let bytes = views.read_bytes(pointer, length)?;
    let text = std::str::from_utf8(bytes).map_err(|_| BridgeError::InvalidText(pointer))?;
    Ok(text.to_string())
}

fn write_text(
    bridge: &mut Bridge,
    guest: &mut dyn GuestRuntime,
    text: &str,
) -> BridgeResult<(u32, u32)> {
    if text.is_empty() {
        return Ok((0, 0));
    }
    let length =
        u32::try_from(text.len()).map_err(|_| BridgeError::LengthTooLarge("text", text.len()))?;
    let pointer = arena::alloc(guest, length)?;
    bridge
        .views
        .views_mut(guest.memory_mut())
        .write_bytes(pointer, text.as_bytes())?;
    Ok((pointer, length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_bytes_round_trip() {
        for byte in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 12, 13, 14, 15] {
            let kind = Kind::from_byte(byte).expect("kind should exist");
            assert_eq!(kind as u8, byte);
            assert!(!kind.name().is_empty());
        }
    }

    #[test]
    fn the_gap_byte_and_out_of_range_bytes_are_rejected() {
        assert_eq!(Kind::from_byte(11), None);
        assert_eq!(Kind::from_byte(16), None);
        assert_eq!(Kind::from_byte(255), None);
    }

    #[test]
    fn layout_constants_match_the_wire_format() {
        assert_eq!(SLOT_SIZE, 16);
        assert_eq!(KIND_OFFSET, 12);
    }
}
