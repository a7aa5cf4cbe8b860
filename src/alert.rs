use bytes::Bytes;

use crate::errors::Result;
use crate::parsing::expect_empty;

tls_struct!(Alert => {
    AlertLevel level;
    AlertDescription description;
});

impl Alert {
    pub const CLOSE_NOTIFY: Alert = Alert {
        level: AlertLevel::warning,
        description: AlertDescription::close_notify,
    };

    pub fn parse_complete(mut input: Bytes) -> Result<Self> {
        let alert = Alert::parse(&mut input)?;
        expect_empty(&input)?;
        Ok(alert)
    }

    pub fn is_fatal(&self) -> bool {
        self.level == AlertLevel::fatal
    }
}

tls_enum_u8!(AlertLevel => {
    warning(1), fatal(2), (255)
});

tls_enum_u8!(AlertDescription => {
    close_notify(0),
    unexpected_message(10),
    bad_record_mac(20),
    decryption_failed(21),
    record_overflow(22),
    decompression_failure(30),
    handshake_failure(40),
    no_certificate(41),
    bad_certificate(42),
    unsupported_certificate(43),
    certificate_revoked(44),
    certificate_expired(45),
    certificate_unknown(46),
    illegal_parameter(47),
    unknown_ca(48),
    access_denied(49),
    decode_error(50),
    decrypt_error(51),
    export_restriction(60),
    protocol_version(70),
    insufficient_security(71),
    internal_error(80),
    inappropriate_fallback(86),
    user_canceled(90),
    no_renegotiation(100),
    unsupported_extension(110),
    unrecognized_name(112),
    bad_certificate_status_response(113),
    unknown_psk_identity(115),
    no_application_protocol(120),
    (255)
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_roundtrip() {
        let alert = Alert {
            level: AlertLevel::fatal,
            description: AlertDescription::bad_record_mac,
        };

        let mut out = vec![];
        alert.serialize(&mut out);
        assert_eq!(&out[..], &[2, 20]);

        let parsed = Alert::parse_complete(Bytes::from(out)).unwrap();
        assert_eq!(parsed, alert);
    }

    #[test]
    fn unknown_description_is_preserved() {
        let parsed = Alert::parse_complete(Bytes::from_static(&[1, 200])).unwrap();
        assert_eq!(parsed.description, AlertDescription::unknown(200));
        assert!(!parsed.is_fatal());
    }
}
