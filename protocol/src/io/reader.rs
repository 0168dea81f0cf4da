use crate::error::ProtocolError;

/// Cursor over a byte slice with bounds-checked reads.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[inline]
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + n)
            .ok_or(ProtocolError::PacketTooShort {
                expected: self.pos + n,
                got: self.data.len(),
            })?;
        self.pos += n;
        Ok(bytes)
    }

    #[inline]
    pub(crate) fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    #[inline]
    pub(crate) fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let bytes: [u8; 2] = self.take(2)?.try_into().unwrap();
        Ok(u16::from_be_bytes(bytes))
    }

    #[inline]
    pub(crate) fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(u64::from_be_bytes(bytes))
    }

    pub(crate) fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Consumes and returns everything left in the buffer.
    #[inline]
    pub(crate) fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.pos
    }
}
