//! WS-Security UsernameToken
//!
//! PasswordDigest = Base64(SHA1(nonce + created + password))

use super::xml::{escape, extract_element, extract_xml_value};
use crate::error::{Error, Result};
use base64::Engine;
use sha1::{Digest, Sha1};

const PASSWORD_DIGEST_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";

/// UsernameToken（ユーザー名 + ダイジェスト + Nonce + Created）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameToken {
    pub username: String,
    /// Base64 password digest
    pub digest: String,
    /// Base64 nonce
    pub nonce: String,
    /// `%Y-%m-%dT%H:%M:%SZ`
    pub created: String,
}

impl UsernameToken {
    /// 新しいNonce/Createdでトークンを生成
    pub fn generate(username: &str, password: &str) -> Self {
        let nonce: [u8; 16] = rand::random();
        let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        Self::with_nonce(username, password, &nonce, &created)
    }

    pub fn with_nonce(username: &str, password: &str, nonce: &[u8], created: &str) -> Self {
        let engine = base64::engine::general_purpose::STANDARD;
        Self {
            username: username.to_string(),
            digest: engine.encode(password_digest(nonce, created, password)),
            nonce: engine.encode(nonce),
            created: created.to_string(),
        }
    }

    /// Parse the token out of a request's `Security` header
    pub fn parse(xml: &str) -> Result<Self> {
        let token = extract_element(xml, "UsernameToken")
            .ok_or_else(|| Error::Unauthorized("missing UsernameToken".to_string()))?;
        let field = |name: &str| {
            extract_xml_value(token, name)
                .ok_or_else(|| Error::Unauthorized(format!("UsernameToken missing {}", name)))
        };
        Ok(Self {
            username: field("Username")?,
            digest: field("Password")?,
            nonce: field("Nonce")?,
            created: field("Created")?,
        })
    }

    /// Recompute the digest with `password` and compare
    pub fn verify(&self, username: &str, password: &str) -> bool {
        if self.username != username {
            return false;
        }
        let Ok(nonce) = base64::engine::general_purpose::STANDARD.decode(&self.nonce) else {
            return false;
        };
        let expected = base64::engine::general_purpose::STANDARD
            .encode(password_digest(&nonce, &self.created, password));
        expected == self.digest
    }

    /// `<s:Header>` fragment carrying this token
    pub fn header_xml(&self) -> String {
        format!(
            r#"<soap:Header>
    <Security xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"
              soap:mustUnderstand="true">
      <UsernameToken>
        <Username>{}</Username>
        <Password Type="{}">{}</Password>
        <Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</Nonce>
        <Created xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">{}</Created>
      </UsernameToken>
    </Security>
  </soap:Header>
  "#,
            escape(&self.username),
            PASSWORD_DIGEST_TYPE,
            self.digest,
            self.nonce,
            self.created
        )
    }
}

fn password_digest(nonce: &[u8], created: &str, password: &str) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::envelope;

    #[test]
    fn test_security_header_generation() {
        let token = UsernameToken::generate("admin", "testpass");
        let header = token.header_xml();
        assert!(header.contains("<Username>admin</Username>"));
        assert!(header.contains("PasswordDigest"));
        assert!(header.contains("<Created"));
    }

    #[test]
    fn test_digest_is_deterministic() {
        let a = UsernameToken::with_nonce("admin", "pw", b"0123456789abcdef", "2024-01-01T00:00:00Z");
        let b = UsernameToken::with_nonce("admin", "pw", b"0123456789abcdef", "2024-01-01T00:00:00Z");
        assert_eq!(a, b);
        let c = UsernameToken::with_nonce("admin", "other", b"0123456789abcdef", "2024-01-01T00:00:00Z");
        assert_ne!(a.digest, c.digest);
    }

    #[test]
    fn test_parse_and_verify() {
        let token = UsernameToken::generate("admin", "secret");
        let doc = envelope("<tds:GetDeviceInformation/>", Some(&token.header_xml()));

        let parsed = UsernameToken::parse(&doc).unwrap();
        assert_eq!(parsed, token);
        assert!(parsed.verify("admin", "secret"));
        assert!(!parsed.verify("admin", "wrong"));
        assert!(!parsed.verify("root", "secret"));
    }

    #[test]
    fn test_parse_missing_token() {
        let doc = envelope("<tds:GetDeviceInformation/>", None);
        assert!(matches!(UsernameToken::parse(&doc), Err(Error::Unauthorized(_))));
    }
}
