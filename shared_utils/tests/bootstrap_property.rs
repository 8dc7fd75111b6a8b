use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use proptest::prelude::*;
use shared_utils::bootstrap::{BootstrapDecoder, BootstrapTarget, DecodeError};
use shared_utils::crypto::CipherKey;

proptest! {
    #[test]
    fn encode_decode_roundtrip(
        address in "[a-z0-9.-]{1,64}",
        port in any::<u16>(),
        aux_port in any::<u16>(),
    ) {
        let decoder = BootstrapDecoder::default();
        let target = BootstrapTarget::new(address, port, aux_port);

        let payload = decoder.encode(&target);
        prop_assert_eq!(decoder.decode(&payload).unwrap(), Some(target));
    }

    #[test]
    fn roundtrip_under_any_key(
        key in any::<[u8; 16]>(),
        iv in any::<[u8; 16]>(),
        port in any::<u16>(),
    ) {
        let decoder = BootstrapDecoder::new(CipherKey::new(key, iv));
        let target = BootstrapTarget::new("tunnel.example.com", port, 0);

        let payload = decoder.encode(&target);
        prop_assert_eq!(decoder.decode(&payload).unwrap(), Some(target));
    }

    #[test]
    fn garbage_never_panics(payload in "\\PC{0,128}") {
        let _ = BootstrapDecoder::default().decode(&payload);
    }

    #[test]
    fn partial_blocks_rejected(bytes in proptest::collection::vec(any::<u8>(), 1..64)) {
        prop_assume!(bytes.len() % 16 != 0);
        let payload = STANDARD.encode(&bytes);

        prop_assert_eq!(
            BootstrapDecoder::default().decode(&payload),
            Err(DecodeError::BlockSize(bytes.len()))
        );
    }
}
