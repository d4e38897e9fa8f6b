//! Typed parcel used for every request and reply.
//!
//! A parcel is a flat byte buffer plus a side table of remote handles.
//! Values must be read back in exactly the order they were written; the
//! per-operation argument order is part of the wire contract.

use crate::remote::RemoteHandle;
use samgr_common::{AbilityId, Error, Result};

const NULL_OBJECT: i32 = -1;

#[derive(Default, Clone)]
pub struct Parcel {
    data: Vec<u8>,
    read_pos: usize,
    objects: Vec<RemoteHandle>,
}

impl std::fmt::Debug for Parcel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parcel")
            .field("len", &self.data.len())
            .field("read_pos", &self.read_pos)
            .field("objects", &self.objects.len())
            .finish()
    }
}

impl Parcel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payload bytes written.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Moves the read cursor back to the start.
    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }

    pub fn write_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let end = self.read_pos + 4;
        let bytes = self
            .data
            .get(self.read_pos..end)
            .ok_or_else(|| Error::parcel(format!("short read at offset {}", self.read_pos)))?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        self.read_pos = end;
        Ok(i32::from_le_bytes(buf))
    }

    pub fn write_ability_id(&mut self, id: AbilityId) {
        self.write_i32(id.as_i32());
    }

    /// Reads an id, rejecting values outside the reserved range.
    pub fn read_ability_id(&mut self) -> Result<AbilityId> {
        AbilityId::new(self.read_i32()?)
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_i32(i32::from(value));
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_i32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::parcel(format!("invalid bool value {}", other))),
        }
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_i32(value.len() as i32);
        self.data.extend_from_slice(value.as_bytes());
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(Error::parcel(format!("negative string length {}", len)));
        }
        let end = self.read_pos + len as usize;
        let bytes = self
            .data
            .get(self.read_pos..end)
            .ok_or_else(|| Error::parcel(format!("string of {} bytes overruns parcel", len)))?;
        let value = String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::parcel(format!("string is not utf-8: {}", e)))?;
        self.read_pos = end;
        Ok(value)
    }

    pub fn write_string_vec(&mut self, values: &[String]) {
        self.write_i32(values.len() as i32);
        for value in values {
            self.write_string(value);
        }
    }

    pub fn read_string_vec(&mut self) -> Result<Vec<String>> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(Error::parcel(format!("negative vector length {}", count)));
        }
        (0..count).map(|_| self.read_string()).collect()
    }

    pub fn write_interface_token(&mut self, token: &str) {
        self.write_string(token);
    }

    pub fn read_interface_token(&mut self) -> Result<String> {
        self.read_string()
    }

    /// Writes a possibly-null remote object.
    pub fn write_remote_object(&mut self, handle: Option<&RemoteHandle>) {
        match handle {
            Some(handle) => {
                let index = self.objects.len() as i32;
                self.objects.push(handle.clone());
                self.write_i32(index);
            }
            None => self.write_i32(NULL_OBJECT),
        }
    }

    /// Reads a possibly-null remote object.
    pub fn read_remote_object(&mut self) -> Result<Option<RemoteHandle>> {
        let index = self.read_i32()?;
        if index == NULL_OBJECT {
            return Ok(None);
        }
        usize::try_from(index)
            .ok()
            .and_then(|i| self.objects.get(i))
            .cloned()
            .map(Some)
            .ok_or_else(|| Error::parcel(format!("invalid object index {}", index)))
    }
}
