use bytes::Bytes;

/// An opaque unit of application data.
///
/// The server never inspects a packet. It hands inbound packets to the
/// callback and turns outbound packets into bytes with [`Packet::to_bytes`]
/// right before writing them to the socket.
pub trait Packet: Send + 'static {
    /// Wire representation of this packet. Must be free of side effects.
    fn to_bytes(&self) -> Bytes;
}

impl Packet for Bytes {
    #[inline]
    fn to_bytes(&self) -> Bytes {
        self.clone()
    }
}

impl Packet for Vec<u8> {
    #[inline]
    fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl Packet for String {
    #[inline]
    fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}
