//! Order-preserving key encodings.
//!
//! Integers are big-endian and strings carry a 2-byte length prefix, so the
//! byte order of encoded keys matches the natural order of the key tuples
//! for fixed-width components.

use crate::backend::{Result, StorageError};
use infera_types::{ActorId, ActorRole, RegretKind};

pub trait KeyCodec: Sized {
    fn encode_key(&self, out: &mut Vec<u8>);

    fn decode_key(input: &mut &[u8]) -> Result<Self>;

    fn to_key_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_key(&mut out);
        out
    }
}

fn take<'a>(input: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if input.len() < len {
        return Err(StorageError::KeyDecode(format!(
            "need {} bytes, {} remaining",
            len,
            input.len()
        )));
    }
    let (head, tail) = input.split_at(len);
    *input = tail;
    Ok(head)
}

impl KeyCodec for () {
    fn encode_key(&self, _out: &mut Vec<u8>) {}

    fn decode_key(_input: &mut &[u8]) -> Result<Self> {
        Ok(())
    }
}

impl KeyCodec for u8 {
    fn encode_key(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        Ok(take(input, 1)?[0])
    }
}

impl KeyCodec for u64 {
    fn encode_key(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(take(input, 8)?);
        Ok(u64::from_be_bytes(buf))
    }
}

impl KeyCodec for String {
    fn encode_key(&self, out: &mut Vec<u8>) {
        let len = self.len().min(u16::MAX as usize);
        out.extend_from_slice(&(len as u16).to_be_bytes());
        out.extend_from_slice(&self.as_bytes()[..len]);
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        let mut len_buf = [0u8; 2];
        len_buf.copy_from_slice(take(input, 2)?);
        let bytes = take(input, u16::from_be_bytes(len_buf) as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| StorageError::KeyDecode(e.to_string()))
    }
}

impl KeyCodec for ActorId {
    fn encode_key(&self, out: &mut Vec<u8>) {
        self.as_str().to_string().encode_key(out);
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        let raw = String::decode_key(input)?;
        ActorId::parse(&raw).map_err(|e| StorageError::KeyDecode(e.to_string()))
    }
}

impl KeyCodec for ActorRole {
    fn encode_key(&self, out: &mut Vec<u8>) {
        out.push(self.code());
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        ActorRole::from_code(u8::decode_key(input)?)
            .map_err(|e| StorageError::KeyDecode(e.to_string()))
    }
}

impl KeyCodec for RegretKind {
    fn encode_key(&self, out: &mut Vec<u8>) {
        out.push(self.code());
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        RegretKind::from_code(u8::decode_key(input)?)
            .map_err(|e| StorageError::KeyDecode(e.to_string()))
    }
}

impl<T: KeyCodec> KeyCodec for Option<T> {
    fn encode_key(&self, out: &mut Vec<u8>) {
        match self {
            None => out.push(0),
            Some(inner) => {
                out.push(1);
                inner.encode_key(out);
            }
        }
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        match u8::decode_key(input)? {
            0 => Ok(None),
            1 => Ok(Some(T::decode_key(input)?)),
            tag => Err(StorageError::KeyDecode(format!("bad option tag {}", tag))),
        }
    }
}

macro_rules! tuple_key_codec {
    ($($name:ident),+) => {
        impl<$($name: KeyCodec),+> KeyCodec for ($($name,)+) {
            #[allow(non_snake_case)]
            fn encode_key(&self, out: &mut Vec<u8>) {
                let ($($name,)+) = self;
                $($name.encode_key(out);)+
            }

            fn decode_key(input: &mut &[u8]) -> Result<Self> {
                Ok(($($name::decode_key(input)?,)+))
            }
        }
    };
}

tuple_key_codec!(A);
tuple_key_codec!(A, B);
tuple_key_codec!(A, B, C);
tuple_key_codec!(A, B, C, D);
