//! Binary property list ("bplist00") codec
//!
//! The decoder accepts the subset Apple senders actually emit in AirPlay
//! request bodies; the encoder exists for the pairing endpoints and for
//! building sender-side bodies in tests.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::PlistValue;

/// Errors that can occur during binary plist decoding
#[derive(Debug, Error)]
pub enum PlistDecodeError {
    /// Header did not start with `bplist00`
    #[error("invalid magic: expected 'bplist00'")]
    InvalidMagic,

    /// Buffer ended before the structure did
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall {
        /// Bytes required
        needed: usize,
        /// Bytes available
        have: usize,
    },

    /// Trailer fields are inconsistent
    #[error("invalid trailer")]
    InvalidTrailer,

    /// Unknown object marker byte
    #[error("invalid object marker: 0x{0:02x}")]
    InvalidObjectMarker(u8),

    /// Object offset points outside the buffer
    #[error("invalid offset: {0}")]
    InvalidOffset(u64),

    /// String content was not valid UTF-8/UTF-16
    #[error("string is not valid unicode")]
    InvalidString,

    /// Self-referencing container
    #[error("circular reference detected")]
    CircularReference,

    /// Integer wider than 64 bits
    #[error("integer overflow")]
    IntegerOverflow,

    /// Dictionary key was not a string
    #[error("dictionary key must be a string")]
    NonStringKey,
}

/// Errors that can occur during binary plist encoding
#[derive(Debug, Error)]
pub enum PlistEncodeError {
    /// More objects than the fixed reference width can address
    #[error("too many objects: {0}")]
    TooManyObjects(usize),
}

/// Decode binary plist data into a [`PlistValue`]
///
/// # Errors
/// Returns `PlistDecodeError` when the input is not a well-formed binary
/// plist.
pub fn decode(data: &[u8]) -> Result<PlistValue, PlistDecodeError> {
    if data.len() < 8 || &data[0..8] != b"bplist00" {
        return Err(PlistDecodeError::InvalidMagic);
    }
    if data.len() < 8 + 32 {
        return Err(PlistDecodeError::BufferTooSmall {
            needed: 40,
            have: data.len(),
        });
    }

    let trailer = &data[data.len() - 32..];
    let offset_size = trailer[6] as usize;
    let ref_size = trailer[7] as usize;
    let num_objects = u64::from_be_bytes(trailer[8..16].try_into().unwrap());
    let root_index = u64::from_be_bytes(trailer[16..24].try_into().unwrap());
    let table_offset = u64::from_be_bytes(trailer[24..32].try_into().unwrap());

    let count = usize::try_from(num_objects).map_err(|_| PlistDecodeError::InvalidTrailer)?;
    let table_start =
        usize::try_from(table_offset).map_err(|_| PlistDecodeError::InvalidTrailer)?;
    if !matches!(offset_size, 1 | 2 | 4 | 8) || !matches!(ref_size, 1 | 2 | 4 | 8) {
        return Err(PlistDecodeError::InvalidTrailer);
    }
    if table_start + count * offset_size > data.len() {
        return Err(PlistDecodeError::BufferTooSmall {
            needed: table_start + count * offset_size,
            have: data.len(),
        });
    }

    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let at = table_start + i * offset_size;
        offsets.push(read_be_uint(&data[at..at + offset_size]));
    }

    let decoder = Decoder {
        data,
        offsets,
        ref_size,
    };
    decoder.decode_object(root_index, &mut HashSet::new())
}

fn read_be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

struct Decoder<'a> {
    data: &'a [u8],
    offsets: Vec<u64>,
    ref_size: usize,
}

impl Decoder<'_> {
    fn decode_object(
        &self,
        index: u64,
        seen: &mut HashSet<u64>,
    ) -> Result<PlistValue, PlistDecodeError> {
        if !seen.insert(index) {
            return Err(PlistDecodeError::CircularReference);
        }

        let offset = *self
            .offsets
            .get(usize::try_from(index).map_err(|_| PlistDecodeError::InvalidOffset(index))?)
            .ok_or(PlistDecodeError::InvalidOffset(index))?;
        let pos = usize::try_from(offset).map_err(|_| PlistDecodeError::InvalidOffset(offset))?;
        if pos >= self.data.len() {
            return Err(PlistDecodeError::InvalidOffset(offset));
        }

        let marker = self.data[pos];
        let value = self.decode_value(marker, pos + 1, seen)?;

        seen.remove(&index);
        Ok(value)
    }

    fn decode_value(
        &self,
        marker: u8,
        pos: usize,
        seen: &mut HashSet<u64>,
    ) -> Result<PlistValue, PlistDecodeError> {
        let kind = marker >> 4;
        let nibble = marker & 0x0F;

        match kind {
            0x0 => match nibble {
                0x0 | 0xF => Ok(PlistValue::Data(Vec::new())),
                0x8 => Ok(PlistValue::Boolean(false)),
                0x9 => Ok(PlistValue::Boolean(true)),
                _ => Err(PlistDecodeError::InvalidObjectMarker(marker)),
            },
            0x1 => self.decode_integer(pos, nibble),
            0x2 => self.decode_real(pos, nibble),
            // A date is an 8-byte real (seconds since the Apple epoch)
            0x3 => self.decode_real(pos, 3),
            0x4 => {
                let (len, start) = self.decode_size(pos, nibble)?;
                Ok(PlistValue::Data(self.slice(start, len)?.to_vec()))
            }
            0x5 => {
                let (len, start) = self.decode_size(pos, nibble)?;
                let s = std::str::from_utf8(self.slice(start, len)?)
                    .map_err(|_| PlistDecodeError::InvalidString)?;
                Ok(PlistValue::String(s.to_string()))
            }
            0x6 => {
                let (len, start) = self.decode_size(pos, nibble)?;
                let bytes = self.slice(start, len * 2)?;
                let u16s: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes(c.try_into().unwrap()))
                    .collect();
                let s = String::from_utf16(&u16s).map_err(|_| PlistDecodeError::InvalidString)?;
                Ok(PlistValue::String(s))
            }
            0xA => self.decode_array(pos, nibble, seen),
            0xD => self.decode_dictionary(pos, nibble, seen),
            _ => Err(PlistDecodeError::InvalidObjectMarker(marker)),
        }
    }

    fn slice(&self, start: usize, len: usize) -> Result<&[u8], PlistDecodeError> {
        if start + len > self.data.len() {
            return Err(PlistDecodeError::BufferTooSmall {
                needed: start + len,
                have: self.data.len(),
            });
        }
        Ok(&self.data[start..start + len])
    }

    fn decode_integer(&self, pos: usize, size_exp: u8) -> Result<PlistValue, PlistDecodeError> {
        let len = 1usize << size_exp;
        let bytes = self.slice(pos, len)?;

        match len {
            #[allow(clippy::cast_possible_wrap)]
            1 => Ok(PlistValue::Integer(i64::from(bytes[0] as i8))),
            2 => Ok(PlistValue::Integer(i64::from(i16::from_be_bytes(
                bytes.try_into().unwrap(),
            )))),
            4 => Ok(PlistValue::Integer(i64::from(i32::from_be_bytes(
                bytes.try_into().unwrap(),
            )))),
            8 => Ok(PlistValue::Integer(i64::from_be_bytes(
                bytes.try_into().unwrap(),
            ))),
            16 => {
                let val = u128::from_be_bytes(bytes.try_into().unwrap());
                i64::try_from(val)
                    .map(PlistValue::Integer)
                    .map_err(|_| PlistDecodeError::IntegerOverflow)
            }
            _ => Err(PlistDecodeError::IntegerOverflow),
        }
    }

    fn decode_real(&self, pos: usize, size_exp: u8) -> Result<PlistValue, PlistDecodeError> {
        let len = 1usize << size_exp;
        let bytes = self.slice(pos, len)?;

        match len {
            4 => Ok(PlistValue::Real(f64::from(f32::from_be_bytes(
                bytes.try_into().unwrap(),
            )))),
            8 => Ok(PlistValue::Real(f64::from_be_bytes(
                bytes.try_into().unwrap(),
            ))),
            _ => Err(PlistDecodeError::InvalidObjectMarker(0x20 | size_exp)),
        }
    }

    /// Resolve a container/blob length; 0xF means the real length follows
    /// as an integer object.
    fn decode_size(&self, pos: usize, nibble: u8) -> Result<(usize, usize), PlistDecodeError> {
        if nibble != 0xF {
            return Ok((nibble as usize, pos));
        }

        let marker = *self
            .data
            .get(pos)
            .ok_or(PlistDecodeError::BufferTooSmall {
                needed: pos + 1,
                have: self.data.len(),
            })?;
        if marker >> 4 != 0x1 {
            return Err(PlistDecodeError::InvalidObjectMarker(marker));
        }
        let len = 1usize << (marker & 0x0F);
        let bytes = self.slice(pos + 1, len)?;
        let size =
            usize::try_from(read_be_uint(bytes)).map_err(|_| PlistDecodeError::IntegerOverflow)?;
        Ok((size, pos + 1 + len))
    }

    fn decode_array(
        &self,
        pos: usize,
        nibble: u8,
        seen: &mut HashSet<u64>,
    ) -> Result<PlistValue, PlistDecodeError> {
        let (count, refs_start) = self.decode_size(pos, nibble)?;
        let refs = self.slice(refs_start, count * self.ref_size)?.to_vec();

        let mut items = Vec::with_capacity(count);
        for chunk in refs.chunks_exact(self.ref_size) {
            items.push(self.decode_object(read_be_uint(chunk), seen)?);
        }
        Ok(PlistValue::Array(items))
    }

    fn decode_dictionary(
        &self,
        pos: usize,
        nibble: u8,
        seen: &mut HashSet<u64>,
    ) -> Result<PlistValue, PlistDecodeError> {
        let (count, refs_start) = self.decode_size(pos, nibble)?;
        let refs = self.slice(refs_start, count * 2 * self.ref_size)?.to_vec();

        let mut dict = HashMap::with_capacity(count);
        for i in 0..count {
            let key_ref = read_be_uint(&refs[i * self.ref_size..(i + 1) * self.ref_size]);
            let val_ref =
                read_be_uint(&refs[(count + i) * self.ref_size..(count + i + 1) * self.ref_size]);

            let PlistValue::String(key) = self.decode_object(key_ref, seen)? else {
                return Err(PlistDecodeError::NonStringKey);
            };
            dict.insert(key, self.decode_object(val_ref, seen)?);
        }
        Ok(PlistValue::Dictionary(dict))
    }
}

/// Encode a [`PlistValue`] to binary plist format
///
/// # Errors
/// Returns `PlistEncodeError` if the value tree holds more objects than
/// the fixed 2-byte reference width can address.
pub fn encode(value: &PlistValue) -> Result<Vec<u8>, PlistEncodeError> {
    let mut encoder = Encoder {
        objects: Vec::new(),
        offsets: Vec::new(),
    };
    let root = encoder.add_value(value);

    if encoder.offsets.len() > usize::from(u16::MAX) {
        return Err(PlistEncodeError::TooManyObjects(encoder.offsets.len()));
    }

    let mut output = Vec::with_capacity(8 + encoder.objects.len() + 32);
    output.extend_from_slice(b"bplist00");
    output.extend_from_slice(&encoder.objects);

    let table_offset = output.len();
    let offset_size: u8 = if table_offset <= 0xFF {
        1
    } else if table_offset <= 0xFFFF {
        2
    } else {
        4
    };
    for &rel in &encoder.offsets {
        let absolute = rel + 8;
        match offset_size {
            1 => output.push(u8::try_from(absolute).unwrap()),
            2 => output.extend_from_slice(&u16::try_from(absolute).unwrap().to_be_bytes()),
            _ => output.extend_from_slice(&u32::try_from(absolute).unwrap().to_be_bytes()),
        }
    }

    // Trailer
    output.extend_from_slice(&[0; 5]);
    output.push(0); // sort version
    output.push(offset_size);
    output.push(REF_SIZE);
    output.extend_from_slice(&(encoder.offsets.len() as u64).to_be_bytes());
    output.extend_from_slice(&(root as u64).to_be_bytes());
    output.extend_from_slice(&(table_offset as u64).to_be_bytes());

    Ok(output)
}

const REF_SIZE: u8 = 2;

struct Encoder {
    objects: Vec<u8>,
    offsets: Vec<usize>,
}

impl Encoder {
    /// Append one object (children first) and return its index.
    fn add_value(&mut self, value: &PlistValue) -> usize {
        // Containers encode child objects before claiming their own slot.
        let body: Option<Vec<u8>> = match value {
            PlistValue::Array(items) => {
                let refs: Vec<usize> = items.iter().map(|v| self.add_value(v)).collect();
                let mut body = Vec::new();
                write_header(&mut body, 0xA, refs.len());
                for r in refs {
                    body.extend_from_slice(&u16::try_from(r).unwrap_or(u16::MAX).to_be_bytes());
                }
                Some(body)
            }
            PlistValue::Dictionary(dict) => {
                let mut keys: Vec<&String> = dict.keys().collect();
                keys.sort();

                let key_refs: Vec<usize> = keys
                    .iter()
                    .map(|k| self.add_value(&PlistValue::String((*k).clone())))
                    .collect();
                let val_refs: Vec<usize> = keys.iter().map(|k| self.add_value(&dict[*k])).collect();

                let mut body = Vec::new();
                write_header(&mut body, 0xD, key_refs.len());
                for r in key_refs.into_iter().chain(val_refs) {
                    body.extend_from_slice(&u16::try_from(r).unwrap_or(u16::MAX).to_be_bytes());
                }
                Some(body)
            }
            _ => None,
        };

        self.offsets.push(self.objects.len());
        let index = self.offsets.len() - 1;

        if let Some(body) = body {
            self.objects.extend_from_slice(&body);
            return index;
        }

        match value {
            PlistValue::Boolean(b) => self.objects.push(if *b { 0x09 } else { 0x08 }),
            PlistValue::Integer(i) => self.write_integer(*i),
            PlistValue::Real(f) => {
                self.objects.push(0x23);
                self.objects.extend_from_slice(&f.to_be_bytes());
            }
            PlistValue::String(s) => {
                if s.is_ascii() {
                    write_header(&mut self.objects, 0x5, s.len());
                    self.objects.extend_from_slice(s.as_bytes());
                } else {
                    let u16s: Vec<u16> = s.encode_utf16().collect();
                    write_header(&mut self.objects, 0x6, u16s.len());
                    for c in u16s {
                        self.objects.extend_from_slice(&c.to_be_bytes());
                    }
                }
            }
            PlistValue::Data(d) => {
                write_header(&mut self.objects, 0x4, d.len());
                self.objects.extend_from_slice(d);
            }
            PlistValue::Array(_) | PlistValue::Dictionary(_) => unreachable!(),
        }

        index
    }

    fn write_integer(&mut self, value: i64) {
        if (0..=127).contains(&value) {
            self.objects.push(0x10);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            self.objects.push(value as u8);
        } else if (0..=32767).contains(&value) {
            self.objects.push(0x11);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            self.objects.extend_from_slice(&(value as u16).to_be_bytes());
        } else if (0..=i64::from(i32::MAX)).contains(&value) {
            self.objects.push(0x12);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            self.objects.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            // Negative integers are always 8 bytes in bplist
            self.objects.push(0x13);
            self.objects.extend_from_slice(&value.to_be_bytes());
        }
    }
}

fn write_header(output: &mut Vec<u8>, kind: u8, len: usize) {
    if len < 15 {
        #[allow(clippy::cast_possible_truncation)]
        output.push((kind << 4) | len as u8);
    } else {
        output.push((kind << 4) | 0xF);
        if len <= 0xFF {
            output.push(0x10);
            #[allow(clippy::cast_possible_truncation)]
            output.push(len as u8);
        } else if len <= 0xFFFF {
            output.push(0x11);
            #[allow(clippy::cast_possible_truncation)]
            output.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            output.push(0x12);
            #[allow(clippy::cast_possible_truncation)]
            output.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
}
