//! Zero-copy wire format decoder
//!
//! The exchange feed is a fixed little-endian binary protocol:
//! a 16-byte header `{seq, type, len, ts}` followed by one of three
//! payload shapes. The decoder is a zero-logic overlay: given a byte
//! buffer of at least the declared length it returns a typed view of the
//! same bytes, no copies.
//!
//! Structs are `#[repr(C, packed)]` (byte-for-byte the wire layout) and
//! derive the zerocopy marker traits, so the casts are checked by the
//! type system rather than hand-rolled pointer arithmetic. Packed fields
//! are read through by-value accessors.

use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned};

use crate::errors::DecodeError;

/// Message type ids on the wire
pub mod msg_type {
    /// Order book update (ADD/MODIFY/DELETE/EXECUTE)
    pub const BOOK_UPDATE: u16 = 1;
    /// Trade execution print
    pub const TRADE: u16 = 2;
    /// Top-of-book quote
    pub const QUOTE: u16 = 3;
}

/// Book update kinds carried in [`BookUpdateMsg::kind`]
pub mod update_kind {
    pub const ADD: u8 = 0;
    pub const MODIFY: u8 = 1;
    pub const DELETE: u8 = 2;
    pub const EXECUTE: u8 = 3;
}

/// Common message header: `{seq, type, len, ts}`
#[derive(Clone, Copy, Debug, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct MsgHeader {
    pub sequence: u32,
    pub msg_type: u16,
    pub msg_len: u16,
    pub timestamp_ns: u64,
}

impl MsgHeader {
    #[inline(always)]
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    #[inline(always)]
    pub fn msg_type(&self) -> u16 {
        self.msg_type
    }

    #[inline(always)]
    pub fn msg_len(&self) -> u16 {
        self.msg_len
    }

    #[inline(always)]
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }
}

/// Order book update: ADD/MODIFY/DELETE/EXECUTE for one order id
#[derive(Clone, Copy, Debug, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct BookUpdateMsg {
    pub header: MsgHeader,
    pub order_id: u64,
    pub symbol_id: u32,
    /// 0 = bid, 1 = ask
    pub side: u8,
    /// See [`update_kind`]
    pub kind: u8,
    pub _pad: u16,
    pub price: f64,
    pub quantity: f64,
}

impl BookUpdateMsg {
    #[inline(always)]
    pub fn order_id(&self) -> u64 {
        self.order_id
    }

    #[inline(always)]
    pub fn symbol_id(&self) -> u32 {
        self.symbol_id
    }

    #[inline(always)]
    pub fn is_bid(&self) -> bool {
        self.side == 0
    }

    #[inline(always)]
    pub fn kind(&self) -> u8 {
        self.kind
    }

    #[inline(always)]
    pub fn price(&self) -> f64 {
        self.price
    }

    #[inline(always)]
    pub fn quantity(&self) -> f64 {
        self.quantity
    }
}

/// Trade execution print
#[derive(Clone, Copy, Debug, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct TradeMsg {
    pub header: MsgHeader,
    pub trade_id: u64,
    pub symbol_id: u32,
    /// 0 = buy aggressor, 1 = sell aggressor
    pub aggressor_side: u8,
    pub _pad: [u8; 3],
    pub price: f64,
    pub quantity: f64,
}

impl TradeMsg {
    #[inline(always)]
    pub fn trade_id(&self) -> u64 {
        self.trade_id
    }

    #[inline(always)]
    pub fn symbol_id(&self) -> u32 {
        self.symbol_id
    }

    #[inline(always)]
    pub fn aggressor_is_buy(&self) -> bool {
        self.aggressor_side == 0
    }

    #[inline(always)]
    pub fn price(&self) -> f64 {
        self.price
    }

    #[inline(always)]
    pub fn quantity(&self) -> f64 {
        self.quantity
    }
}

/// Top-of-book quote (BBO)
#[derive(Clone, Copy, Debug, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct QuoteMsg {
    pub header: MsgHeader,
    pub symbol_id: u32,
    pub _pad: u32,
    pub bid_price: f64,
    pub bid_quantity: f64,
    pub ask_price: f64,
    pub ask_quantity: f64,
}

impl QuoteMsg {
    #[inline(always)]
    pub fn symbol_id(&self) -> u32 {
        self.symbol_id
    }

    #[inline(always)]
    pub fn bid(&self) -> (f64, f64) {
        (self.bid_price, self.bid_quantity)
    }

    #[inline(always)]
    pub fn ask(&self) -> (f64, f64) {
        (self.ask_price, self.ask_quantity)
    }
}

/// A decoded message: typed views borrowing the input buffer
#[derive(Debug)]
pub enum Message<'a> {
    BookUpdate(&'a BookUpdateMsg),
    Trade(&'a TradeMsg),
    Quote(&'a QuoteMsg),
}

/// Minimal header sanity check: rejects truncated buffers, declared
/// lengths that overrun the buffer, and unrecognized message types.
#[inline]
pub fn validate_header(buf: &[u8]) -> Result<&MsgHeader, DecodeError> {
    let header_len = std::mem::size_of::<MsgHeader>();
    let Some((view, _)) = LayoutVerified::<_, MsgHeader>::new_unaligned_from_prefix(buf) else {
        return Err(DecodeError::Truncated {
            have: buf.len(),
            need: header_len,
        });
    };
    let header = view.into_ref();

    let declared = header.msg_len() as usize;
    if declared > buf.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            have: buf.len(),
        });
    }

    match header.msg_type() {
        msg_type::BOOK_UPDATE | msg_type::TRADE | msg_type::QUOTE => Ok(header),
        other => Err(DecodeError::UnknownType { msg_type: other }),
    }
}

/// Decode one message from `buf` as a typed zero-copy view.
///
/// Failures are for the caller to count and drop; they never propagate
/// into the pipeline.
#[inline]
pub fn decode(buf: &[u8]) -> Result<Message<'_>, DecodeError> {
    let header = validate_header(buf)?;
    let msg_type = header.msg_type();

    match msg_type {
        msg_type::BOOK_UPDATE => overlay::<BookUpdateMsg>(buf).map(Message::BookUpdate),
        msg_type::TRADE => overlay::<TradeMsg>(buf).map(Message::Trade),
        msg_type::QUOTE => overlay::<QuoteMsg>(buf).map(Message::Quote),
        other => Err(DecodeError::UnknownType { msg_type: other }),
    }
}

#[inline(always)]
fn overlay<T: FromBytes + Unaligned>(buf: &[u8]) -> Result<&T, DecodeError> {
    match LayoutVerified::<_, T>::new_unaligned_from_prefix(buf) {
        Some((view, _)) => Ok(view.into_ref()),
        None => Err(DecodeError::Truncated {
            have: buf.len(),
            need: std::mem::size_of::<T>(),
        }),
    }
}
