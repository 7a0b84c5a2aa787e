use tokio_util::{
    bytes::{Buf, BytesMut},
    codec::{Decoder, Encoder},
};

use crate::frame::Request;

/// Passes whole datagrams up and writes encoded requests down. Parsing
/// happens in the transport, which knows the datagram source.
#[derive(Debug)]
pub struct OrviboCoder;

impl Decoder for OrviboCoder {
    type Item = Vec<u8>;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let result = src.to_vec();
        src.advance(result.len());

        Ok(Some(result))
    }
}

impl Encoder<Request> for OrviboCoder {
    type Error = std::io::Error;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.encode());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mac;
    use hex_literal::hex;

    #[test]
    fn test_decode_whole_datagram() {
        let mut src = BytesMut::from(&hex!("6864 0017 7366 accf230a1bff")[..]);
        let item = OrviboCoder.decode(&mut src).unwrap();

        assert_eq!(item, Some(hex!("6864 0017 7366 accf230a1bff").to_vec()));
        assert!(src.is_empty());
        assert_eq!(OrviboCoder.decode(&mut src).unwrap(), None);
    }

    #[test]
    fn test_encode_request() {
        let mut dst = BytesMut::new();
        let request = Request::SetState(Mac(hex!("accf230a1bff")), true);
        OrviboCoder.encode(request, &mut dst).unwrap();

        assert_eq!(&dst[..], &request.encode()[..]);
    }
}
