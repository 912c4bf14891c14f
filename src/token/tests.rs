use super::*;

fn access_codec() -> TokenCodec {
    TokenCodec::new(TokenKind::Access, &SecretKey::from_bytes([0u8; 32]))
}

fn refresh_codec() -> TokenCodec {
    TokenCodec::new(TokenKind::Refresh, &SecretKey::from_bytes([1u8; 32]))
}

/// Seals an arbitrary payload under the access test key.
fn seal(payload: &str) -> String {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&[0u8; 32]));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut combined = nonce.to_vec();
    combined.extend(cipher.encrypt(&nonce, payload.as_bytes()).unwrap());
    BASE64.encode(combined)
}

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let codec = access_codec();

    for (tenant, user_id) in [
        (Tenant::Company, 1),
        (Tenant::Student, 42),
        (Tenant::Company, i64::MAX),
        (Tenant::Student, -7),
    ] {
        let token = codec.encrypt(tenant, user_id).unwrap();
        let principal = codec.decrypt(&token).unwrap();
        assert_eq!(principal, Principal { tenant, user_id });
    }
}

#[test]
fn test_repeated_encrypt_is_fresh() {
    let codec = refresh_codec();

    let first = codec.encrypt(Tenant::Company, 1).unwrap();
    let second = codec.encrypt(Tenant::Company, 1).unwrap();
    assert_ne!(first, second);

    // Nonces differ too, not just the filler
    let n1 = BASE64.decode(&first).unwrap();
    let n2 = BASE64.decode(&second).unwrap();
    assert_ne!(n1[..NONCE_SIZE], n2[..NONCE_SIZE]);
}

#[test]
fn test_filler_length_differs_by_kind() {
    // ciphertext = plaintext + 16-byte tag; plaintext grows with the filler
    let access = BASE64
        .decode(access_codec().encrypt(Tenant::Student, 5).unwrap())
        .unwrap();
    let refresh = BASE64
        .decode(refresh_codec().encrypt(Tenant::Student, 5).unwrap())
        .unwrap();
    assert_eq!(refresh.len() - access.len(), 16);

    let plaintext_len = "appkind:student|user_id:5|random:".len() + 16;
    assert_eq!(access.len(), NONCE_SIZE + plaintext_len + 16);
}

#[test]
fn test_single_byte_tamper_fails_authentication() {
    let codec = access_codec();
    let token = codec.encrypt(Tenant::Company, 99).unwrap();
    let decoded = BASE64.decode(&token).unwrap();

    for i in 0..decoded.len() {
        let mut tampered = decoded.clone();
        tampered[i] ^= 0x01;
        let result = codec.decrypt(&BASE64.encode(&tampered));
        assert_eq!(
            result,
            Err(TokenError::AuthenticationFailure {
                kind: TokenKind::Access
            }),
            "byte {} was not detected",
            i
        );
    }
}

#[test]
fn test_wrong_key_fails_authentication() {
    let token = access_codec().encrypt(Tenant::Company, 1).unwrap();
    let other = TokenCodec::new(TokenKind::Access, &SecretKey::from_bytes([2u8; 32]));
    assert!(matches!(
        other.decrypt(&token),
        Err(TokenError::AuthenticationFailure { .. })
    ));

    // An access token is never accepted by the refresh codec
    assert!(matches!(
        refresh_codec().decrypt(&token),
        Err(TokenError::AuthenticationFailure {
            kind: TokenKind::Refresh
        })
    ));
}

#[test]
fn test_malformed_tokens() {
    let codec = access_codec();
    let malformed: Result<Principal, TokenError> = Err(TokenError::MalformedToken {
        kind: TokenKind::Access,
    });

    assert_eq!(codec.decrypt("not base64 at all!"), malformed);
    assert_eq!(codec.decrypt(""), malformed);
    assert_eq!(codec.decrypt(&BASE64.encode([0u8; 11])), malformed);
}

#[test]
fn test_nonce_only_token_fails_authentication() {
    let codec = access_codec();
    assert!(matches!(
        codec.decrypt(&BASE64.encode([0u8; NONCE_SIZE])),
        Err(TokenError::AuthenticationFailure { .. })
    ));
}

#[test]
fn test_payload_format_is_enforced() {
    let codec = access_codec();
    let cases = [
        "appkind:company|user_id:1",
        "appkind:company|user_id:1|random:abc|extra",
        "kind:company|user_id:1|random:abc",
        "appkind:company|uid:1|random:abc",
        "appkind:company|user_id:one|random:abc",
        "appkind:common|user_id:1|random:abc",
    ];

    for payload in cases {
        let result = codec.decrypt(&seal(payload));
        assert!(
            matches!(result, Err(TokenError::InvalidTokenFormat { .. })),
            "{} was accepted: {:?}",
            payload,
            result
        );
    }

    // Third field is filler and is not inspected
    let principal = codec
        .decrypt(&seal("appkind:student|user_id:3|anything"))
        .unwrap();
    assert_eq!(
        principal,
        Principal {
            tenant: Tenant::Student,
            user_id: 3
        }
    );
}

#[test]
fn test_principal_serializes_with_app_kind() {
    let principal = Principal {
        tenant: Tenant::Company,
        user_id: 8,
    };
    let json = serde_json::to_value(principal).unwrap();
    assert_eq!(json["app_kind"], "company");
    assert_eq!(json["user_id"], 8);
}
