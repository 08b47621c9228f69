//! SRP-6 client for the `Srp` and `Srp256` plugins.
//!
//! The group is fixed: a 1024 bit safe prime with generator 2. The client
//! sends its hex encoded public key in the connect identification block; the
//! server answers with its salt and public key, and the client proves
//! knowledge of the password with a single hash, SHA-1 for `Srp` and SHA-256
//! for `Srp256`. The shared session key is always the SHA-1 of the secret.
use num_bigint::BigUint;
use rand::RngCore;
use sha1::{Digest, Sha1};
use sha2::Sha256;

use super::AuthError;

const PRIME_HEX: &str = "E67D2E994B2F900C3F41F08F5BB2627ED0D49EE1FE767A52EFCD565CD6E76881\
                         2C3E1E9CE8F0A8BEA6CB13CD29DDEBF7A96D4A93B55D488DF099A15C89DCB064\
                         0738EB2CBDD9A8F7BAB561AB1B0DC1C6CDABF303264A08D1BCA932D1F1EE428B\
                         619D970F342ABA9A65793B8B2F041AE5364350C16F735F56ECBCA87BD057D121";

const K_DEC: &[u8] = b"1277432915985975349439481660349303019122249719989";

fn prime() -> BigUint {
    BigUint::parse_bytes(PRIME_HEX.as_bytes(), 16).unwrap()
}

fn generator() -> BigUint {
    BigUint::from(2u32)
}

fn multiplier() -> BigUint {
    BigUint::parse_bytes(K_DEC, 10).unwrap()
}

fn sha1(parts: &[&[u8]]) -> Vec<u8> {
    let mut h = Sha1::new();
    for part in parts {
        h.update(part);
    }
    h.finalize().to_vec()
}

fn sha256(parts: &[&[u8]]) -> Vec<u8> {
    let mut h = Sha256::new();
    for part in parts {
        h.update(part);
    }
    h.finalize().to_vec()
}

fn to_int(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Hash used for the client proof; the session key hash is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofHash {
    Sha1,
    Sha256,
}

/// Client side of one SRP exchange.
#[derive(Debug)]
pub struct SrpClient {
    secret: BigUint,
    public: BigUint,
    proof_hash: ProofHash,
}

/// Outcome of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpProof {
    /// Hex encoded proof, sent back verbatim as auth data.
    pub auth_data: Vec<u8>,
    /// Shared session key, kept for wire encryption negotiation.
    pub session_key: Vec<u8>,
}

impl SrpClient {
    pub fn new(proof_hash: ProofHash) -> Self {
        let mut seed = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(proof_hash, &seed)
    }

    /// Deterministic construction for reproducible exchanges.
    pub fn from_seed(proof_hash: ProofHash, seed: &[u8]) -> Self {
        let secret = to_int(seed);
        let public = generator().modpow(&secret, &prime());
        Self { secret, public, proof_hash }
    }

    /// Same key pair under a different proof hash; used when the server
    /// switches between `Srp` and `Srp256` mid handshake.
    pub fn with_proof_hash(self, proof_hash: ProofHash) -> Self {
        Self { proof_hash, ..self }
    }

    /// Hex encoded client public key for the identification block.
    pub fn public_hex(&self) -> String {
        hex::encode(self.public.to_bytes_be())
    }

    /// Complete the exchange against the server's reply data: a little-endian
    /// length prefixed salt, then a length prefixed hex public key.
    pub fn client_proof(
        &self,
        user: &str,
        password: &str,
        server_data: &[u8],
    ) -> Result<SrpProof, AuthError> {
        let (salt, server_public) = parse_server_data(server_data)?;
        let user = user.to_uppercase();

        let n = prime();
        let g = generator();
        let k = multiplier();

        // x = H(salt | H(user : password)), u = H(A | B)
        let inner = sha1(&[user.as_bytes(), b":", password.as_bytes()]);
        let x = to_int(&sha1(&[&salt, &inner]));
        let u = to_int(&sha1(&[&self.public.to_bytes_be(), &server_public.to_bytes_be()]));

        // S = (B - k * g^x) ^ (a + u * x) mod N
        let gx = g.modpow(&x, &n);
        let base = (&server_public + &n - (k * &gx) % &n) % &n;
        let exponent = &self.secret + u * x;
        let secret = base.modpow(&exponent, &n);
        let session_key = sha1(&[&secret.to_bytes_be()]);

        // M = H(H(N) xor H(g) | H(user) | salt | A | B | K)
        let n_xor_g: Vec<u8> = sha1(&[&n.to_bytes_be()])
            .iter()
            .zip(sha1(&[&g.to_bytes_be()]))
            .map(|(a, b)| a ^ b)
            .collect();
        let user_hash = sha1(&[user.as_bytes()]);
        let parts: &[&[u8]] = &[
            &n_xor_g,
            &user_hash,
            &salt,
            &self.public.to_bytes_be(),
            &server_public.to_bytes_be(),
            &session_key,
        ];
        let proof = match self.proof_hash {
            ProofHash::Sha1 => sha1(parts),
            ProofHash::Sha256 => sha256(parts),
        };

        Ok(SrpProof {
            auth_data: hex::encode(proof).into_bytes(),
            session_key,
        })
    }
}

fn parse_server_data(data: &[u8]) -> Result<(Vec<u8>, BigUint), AuthError> {
    fn chunk(data: &[u8], at: usize) -> Option<(&[u8], usize)> {
        let len = u16::from_le_bytes(data.get(at..at + 2)?.try_into().ok()?) as usize;
        let chunk = data.get(at + 2..at + 2 + len)?;
        Some((chunk, at + 2 + len))
    }
    let (salt, next) = chunk(data, 0).ok_or(AuthError::MalformedData)?;
    let (key_hex, _) = chunk(data, next).ok_or(AuthError::MalformedData)?;
    let key = hex::decode(key_hex).map_err(|_| AuthError::MalformedData)?;
    Ok((salt.to_vec(), to_int(&key)))
}

#[cfg(test)]
mod test {
    use super::*;

    /// Minimal server side, enough to validate the client against.
    struct Server {
        salt: Vec<u8>,
        secret: BigUint,
        public: BigUint,
        verifier: BigUint,
    }

    impl Server {
        fn new(user: &str, password: &str) -> Self {
            let n = prime();
            let salt = vec![7u8; 32];
            let inner = sha1(&[user.to_uppercase().as_bytes(), b":", password.as_bytes()]);
            let x = to_int(&sha1(&[&salt, &inner]));
            let verifier = generator().modpow(&x, &n);
            let secret = to_int(&[3u8; 16]);
            let public = (multiplier() * &verifier + generator().modpow(&secret, &n)) % n;
            Self { salt, secret, public, verifier }
        }

        fn reply_data(&self) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(&(self.salt.len() as u16).to_le_bytes());
            out.extend_from_slice(&self.salt);
            let key_hex = hex::encode(self.public.to_bytes_be());
            out.extend_from_slice(&(key_hex.len() as u16).to_le_bytes());
            out.extend_from_slice(key_hex.as_bytes());
            out
        }

        fn session_key(&self, client_public_hex: &str) -> Vec<u8> {
            let n = prime();
            let a = to_int(&hex::decode(client_public_hex).unwrap());
            let u = to_int(&sha1(&[&a.to_bytes_be(), &self.public.to_bytes_be()]));
            let secret = (a * self.verifier.modpow(&u, &n)).modpow(&self.secret, &n);
            sha1(&[&secret.to_bytes_be()])
        }
    }

    #[test]
    fn client_and_server_agree_on_session_key() {
        let server = Server::new("sysdba", "masterkey");
        let client = SrpClient::from_seed(ProofHash::Sha256, &[5u8; 16]);
        let proof = client
            .client_proof("sysdba", "masterkey", &server.reply_data())
            .unwrap();
        assert_eq!(proof.session_key, server.session_key(&client.public_hex()));
        // proof is hex encoded: sha256 digest doubles to 64 bytes
        assert_eq!(proof.auth_data.len(), 64);
        assert!(proof.auth_data.iter().all(u8::is_ascii_hexdigit));
    }

    #[test]
    fn wrong_password_diverges() {
        let server = Server::new("sysdba", "masterkey");
        let client = SrpClient::from_seed(ProofHash::Sha1, &[5u8; 16]);
        let proof = client
            .client_proof("sysdba", "wrong", &server.reply_data())
            .unwrap();
        assert_ne!(proof.session_key, server.session_key(&client.public_hex()));
    }

    #[test]
    fn user_name_is_case_insensitive() {
        let server = Server::new("SYSDBA", "masterkey");
        let client = SrpClient::from_seed(ProofHash::Sha1, &[9u8; 16]);
        let proof = client
            .client_proof("sysdba", "masterkey", &server.reply_data())
            .unwrap();
        assert_eq!(proof.session_key, server.session_key(&client.public_hex()));
    }

    #[test]
    fn malformed_server_data_is_rejected() {
        let client = SrpClient::from_seed(ProofHash::Sha1, &[1u8; 16]);
        assert!(matches!(
            client.client_proof("a", "b", &[4, 0, 1]),
            Err(AuthError::MalformedData),
        ));
        // non-hex server key
        assert!(matches!(
            client.client_proof("a", "b", &[1, 0, 7, 2, 0, b'z', b'z']),
            Err(AuthError::MalformedData),
        ));
    }
}
