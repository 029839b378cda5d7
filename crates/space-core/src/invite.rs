//! Invite capability (§3, §4.4)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical;
use crate::clock::{Clock, Csprng};
use crate::crypto::{b64_decode, b64_encode, KeyPair};
use crate::error::{Error, Result};
use crate::identifiers::{generate_invite_id, id_from_spki, verify_id_from_spki};
use crate::identity::{DelegationCert, Identity, CLOCK_SKEW_MS};

/// Signed by the Space Root; authorizes another Principal to issue invites
/// with a subset of scopes for a validity window (§3 "InviteIssuerCertificate").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InviteIssuerCertificate {
    pub v: u64,
    pub space_id: String,
    pub space_root_pub: String,
    pub issuer_principal_id: String,
    pub issuer_principal_pub: String,
    pub not_before_ts: u64,
    pub expires_ts: u64,
    pub allowed_scopes: Vec<String>,
    pub sig: String,
}

impl InviteIssuerCertificate {
    pub fn new(
        space_root: &KeyPair,
        issuer_principal_pub: &[u8; 32],
        not_before_ts: u64,
        expires_ts: u64,
        allowed_scopes: Vec<String>,
    ) -> Self {
        let space_root_pub = space_root.public_key();
        let space_id = id_from_spki(&space_root_pub);
        let issuer_principal_id = id_from_spki(issuer_principal_pub);
        let sig_input = canonical::iic_sig_input(
            1,
            &space_id,
            &space_root_pub,
            &issuer_principal_id,
            issuer_principal_pub,
            not_before_ts,
            expires_ts,
            &allowed_scopes,
        );
        let sig = space_root.sign(&sig_input);
        Self {
            v: 1,
            space_id,
            space_root_pub: b64_encode(&space_root_pub),
            issuer_principal_id,
            issuer_principal_pub: b64_encode(issuer_principal_pub),
            not_before_ts,
            expires_ts,
            allowed_scopes,
            sig: b64_encode(&sig),
        }
    }

    pub fn space_root_pub_bytes(&self) -> Result<[u8; 32]> {
        decode_pub(&self.space_root_pub)
    }

    fn issuer_principal_pub_bytes(&self) -> Result<[u8; 32]> {
        decode_pub(&self.issuer_principal_pub)
    }

    fn sig_input(&self) -> Result<Vec<u8>> {
        Ok(canonical::iic_sig_input(
            self.v,
            &self.space_id,
            &self.space_root_pub_bytes()?,
            &self.issuer_principal_id,
            &self.issuer_principal_pub_bytes()?,
            self.not_before_ts,
            self.expires_ts,
            &self.allowed_scopes,
        ))
    }

    pub fn sig_bytes(&self) -> Result<Vec<u8>> {
        b64_decode(&self.sig)
    }

    /// Signature and identity checks, plus the (skewed) validity window.
    pub fn verify(&self, now_ms: u64) -> Result<()> {
        let space_root_pub = self.space_root_pub_bytes()?;
        let issuer_pub = self.issuer_principal_pub_bytes()?;
        verify_id_from_spki(&self.issuer_principal_id, &issuer_pub)?;
        let sig_input = self.sig_input()?;
        let sig = self.sig_bytes()?;
        KeyPair::verify(&space_root_pub, &sig_input, &sig)?;

        if now_ms + CLOCK_SKEW_MS < self.not_before_ts || now_ms > self.expires_ts + CLOCK_SKEW_MS
        {
            return Err(Error::InvalidIdentifier(format!(
                "IIC window [{}, {}] does not cover {now_ms}",
                self.not_before_ts, self.expires_ts
            )));
        }
        Ok(())
    }

    /// Whether every scope in `scopes` is present in `allowed_scopes`
    /// (§8 "Capability subset").
    pub fn covers(&self, scopes: &[String]) -> bool {
        scopes.iter().all(|s| self.allowed_scopes.contains(s))
    }
}

/// Capability object admitting a Principal into a Space (§3 "Invite").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invite {
    pub v: u64,
    pub space_id: String,
    pub invite_id: String,
    pub issued_ts: u64,
    pub expires_ts: u64,
    pub issuer_principal_id: String,
    pub issuer_device_id: String,
    pub issuer_device_pub: String,
    pub issuer_delegation: DelegationCert,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_issuer: Option<InviteIssuerCertificate>,
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Value>,
    #[serde(default = "empty_object")]
    pub bootstrap: Value,
    pub sig: String,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl Invite {
    /// Issue a new invite. `scopes` must include `space:<space_id>:read`;
    /// callers are responsible for that per §4.4 (checked in [`Invite::verify`]
    /// at the receiving end, not enforced here against a malicious issuer).
    #[allow(clippy::too_many_arguments)]
    pub fn issue(
        issuer: &mut Identity,
        space_id: &str,
        expires_ts: u64,
        scopes: Vec<String>,
        constraints: Option<Value>,
        bootstrap: Value,
        invite_issuer: Option<InviteIssuerCertificate>,
        clock: &dyn Clock,
        rng: &mut dyn Csprng,
    ) -> Result<Self> {
        let delegation = issuer.ensure_delegation_for_space(space_id, clock).clone();
        let invite_id = generate_invite_id(rng);
        let issued_ts = clock.now_ms();
        let issuer_device_pub = issuer.device().public_key();

        let constraints_jcs = canonical::jcs_or_empty_object(&constraints)?;
        let bootstrap_jcs = crate::jcs::to_vec(&bootstrap)?;

        let sig_input = canonical::invite_sig_input(
            1,
            space_id,
            &invite_id,
            issued_ts,
            expires_ts,
            &issuer.principal_id,
            &issuer.device_id,
            &issuer_device_pub,
            &delegation.sig_bytes()?,
            invite_issuer
                .as_ref()
                .map(|c| c.sig_bytes())
                .transpose()?
                .as_deref(),
            &constraints_jcs,
            &bootstrap_jcs,
        );
        let sig = issuer.device().sign(&sig_input);

        Ok(Self {
            v: 1,
            space_id: space_id.to_string(),
            invite_id,
            issued_ts,
            expires_ts,
            issuer_principal_id: issuer.principal_id.clone(),
            issuer_device_id: issuer.device_id.clone(),
            issuer_device_pub: b64_encode(&issuer_device_pub),
            issuer_delegation: delegation,
            invite_issuer,
            scopes,
            constraints,
            bootstrap,
            sig: b64_encode(&sig),
        })
    }

    fn issuer_device_pub_bytes(&self) -> Result<[u8; 32]> {
        decode_pub(&self.issuer_device_pub)
    }

    fn sig_input(&self) -> Result<Vec<u8>> {
        let constraints_jcs = canonical::jcs_or_empty_object(&self.constraints)?;
        let bootstrap_jcs = crate::jcs::to_vec(&self.bootstrap)?;
        Ok(canonical::invite_sig_input(
            self.v,
            &self.space_id,
            &self.invite_id,
            self.issued_ts,
            self.expires_ts,
            &self.issuer_principal_id,
            &self.issuer_device_id,
            &self.issuer_device_pub_bytes()?,
            &self.issuer_delegation.sig_bytes()?,
            self.invite_issuer
                .as_ref()
                .map(|c| c.sig_bytes())
                .transpose()?
                .as_deref(),
            &constraints_jcs,
            &bootstrap_jcs,
        ))
    }

    /// Full verification chain of §4.4 (a)-(f). `space_root_pub` comes from
    /// the Space's genesis, when the caller has one available.
    pub fn verify(&self, space_root_pub: &[u8; 32], now_ms: u64) -> Result<()> {
        let issuer_device_pub = self.issuer_device_pub_bytes()?;
        verify_id_from_spki(&self.issuer_device_id, &issuer_device_pub)?;

        // (c) delegation ids match issuer ids.
        if self.issuer_delegation.principal_id != self.issuer_principal_id
            || self.issuer_delegation.device_id != self.issuer_device_id
        {
            return Err(Error::InvalidIdentifier(
                "invite delegation does not match issuer ids".into(),
            ));
        }
        self.issuer_delegation.verify(now_ms)?;

        // (d) expiry.
        if now_ms > self.expires_ts {
            return Err(Error::InvalidIdentifier("invite expired".into()));
        }

        // (e) Space Root path or IIC path.
        match &self.invite_issuer {
            None => {
                if self.issuer_principal_id != self.space_id {
                    return Err(Error::InvalidIdentifier(
                        "invite has no IIC and issuer is not the Space Root".into(),
                    ));
                }
            }
            Some(iic) => {
                if iic.space_id != self.space_id {
                    return Err(Error::InvalidIdentifier(
                        "IIC space_id does not match invite".into(),
                    ));
                }
                if iic.space_root_pub_bytes()? != *space_root_pub {
                    return Err(Error::InvalidIdentifier(
                        "IIC is not signed by this Space's root key".into(),
                    ));
                }
                if iic.issuer_principal_id != self.issuer_principal_id {
                    return Err(Error::InvalidIdentifier(
                        "IIC issuer does not match invite issuer".into(),
                    ));
                }
                iic.verify(now_ms)?;
                if !iic.covers(&self.scopes) {
                    return Err(Error::InvalidIdentifier(
                        "invite scopes are not a subset of the IIC's allowed scopes".into(),
                    ));
                }
            }
        }

        // (f) invite signature under issuer device key.
        let sig_input = self.sig_input()?;
        let sig = b64_decode(&self.sig)?;
        KeyPair::verify(&issuer_device_pub, &sig_input, &sig)?;

        let read_scope = format!("space:{}:read", self.space_id);
        if !self.scopes.iter().any(|s| s == &read_scope) {
            return Err(Error::InvalidIdentifier(
                "invite scopes do not include the read scope".into(),
            ));
        }
        Ok(())
    }

    /// Parsed `requires_pow` sub-object from `constraints`, if present.
    pub fn pow_requirement(&self) -> Option<PowRequirement> {
        self.constraints
            .as_ref()?
            .get("requires_pow")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// `constraints.bound_principal_id`, if present.
    pub fn bound_principal_id(&self) -> Option<String> {
        self.constraints
            .as_ref()?
            .get("bound_principal_id")
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    /// `constraints.max_uses`, parsed but (per the explicit Non-goal) never
    /// enforced by this crate.
    pub fn max_uses(&self) -> Option<u64> {
        self.constraints.as_ref()?.get("max_uses")?.as_u64()
    }
}

fn decode_pub(s: &str) -> Result<[u8; 32]> {
    let bytes = b64_decode(s)?;
    bytes
        .try_into()
        .map_err(|_| Error::InvalidPublicKey("expected 32-byte public key".into()))
}

/// Proof-of-work requirement attached to `constraints.requires_pow`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PowRequirement {
    pub bits: u32,
    pub expires_ts: u64,
}

/// Count of leading zero bits in `digest`.
pub fn leading_zero_bits(digest: &[u8; 32]) -> u32 {
    let mut count = 0;
    for byte in digest {
        if *byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

/// Verify a join-time PoW solution against `requirement` (§4.4).
pub fn verify_pow(
    invite_id: &str,
    joiner_principal_id: &str,
    pow_nonce: &[u8],
    requirement: &PowRequirement,
    now_ms: u64,
) -> Result<()> {
    if now_ms > requirement.expires_ts {
        return Err(Error::InvalidIdentifier("PoW solution expired".into()));
    }
    let input = canonical::pow_input(invite_id, joiner_principal_id, pow_nonce);
    let digest = crate::crypto::sha256(&input);
    if leading_zero_bits(&digest) < requirement.bits {
        return Err(Error::InvalidIdentifier(
            "PoW solution does not meet required difficulty".into(),
        ));
    }
    Ok(())
}

/// Brute-force a PoW solution (reference implementation; joiners may use any
/// search strategy as long as the result verifies).
pub fn solve_pow(
    invite_id: &str,
    joiner_principal_id: &str,
    requirement: &PowRequirement,
    rng: &mut dyn Csprng,
) -> Vec<u8> {
    let mut nonce = [0u8; 16];
    loop {
        rng.fill_bytes(&mut nonce);
        let input = canonical::pow_input(invite_id, joiner_principal_id, &nonce);
        let digest = crate::crypto::sha256(&input);
        if leading_zero_bits(&digest) >= requirement.bits {
            return nonce.to_vec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, TestCsprng};
    use serde_json::json;

    fn issue_space_root_invite(space_root: &KeyPair, issuer: &mut Identity) -> Invite {
        let clock = FixedClock(1_000_000);
        let mut rng = TestCsprng::new(7);
        let space_id = issuer.principal_id.clone();
        Invite::issue(
            issuer,
            &space_id,
            2_000_000,
            vec![format!("space:{space_id}:read"), format!("space:{space_id}:post")],
            None,
            json!({}),
            None,
            &clock,
            &mut rng,
        )
        .unwrap()
    }

    #[test]
    fn space_root_invite_verifies() {
        let mut rng = TestCsprng::new(1);
        let mut root_identity = Identity::create(&mut rng);
        let space_root_pub = root_identity.principal().public_key();
        // For the Space Root path, issuer_principal_id must equal space_id,
        // i.e. the invite is issued for the Space rooted at this identity.
        let invite = issue_space_root_invite(root_identity.principal(), &mut root_identity);
        assert!(invite.verify(&space_root_pub, 1_500_000).is_ok());
    }

    #[test]
    fn invite_rejects_after_expiry() {
        let mut rng = TestCsprng::new(1);
        let mut root_identity = Identity::create(&mut rng);
        let space_root_pub = root_identity.principal().public_key();
        let invite = issue_space_root_invite(root_identity.principal(), &mut root_identity);
        assert!(invite.verify(&space_root_pub, 2_000_001).is_err());
    }

    #[test]
    fn iic_invite_enforces_scope_subset() {
        let mut rng = TestCsprng::new(2);
        let mut root_identity = Identity::create(&mut rng);
        let space_root_pub = root_identity.principal().public_key();
        let space_id = root_identity.principal_id.clone();

        let mut issuer_identity = Identity::create(&mut rng);
        let iic = InviteIssuerCertificate::new(
            root_identity.principal(),
            &issuer_identity.principal().public_key(),
            0,
            3_000_000,
            vec![format!("space:{space_id}:read")],
        );

        let clock = FixedClock(1_000_000);
        let ok_invite = Invite::issue(
            &mut issuer_identity,
            &space_id,
            2_000_000,
            vec![format!("space:{space_id}:read")],
            None,
            json!({}),
            Some(iic.clone()),
            &clock,
            &mut rng,
        )
        .unwrap();
        assert!(ok_invite.verify(&space_root_pub, 1_500_000).is_ok());

        let over_scoped = Invite::issue(
            &mut issuer_identity,
            &space_id,
            2_000_000,
            vec![
                format!("space:{space_id}:read"),
                format!("space:{space_id}:governance"),
            ],
            None,
            json!({}),
            Some(iic),
            &clock,
            &mut rng,
        )
        .unwrap();
        assert!(over_scoped.verify(&space_root_pub, 1_500_000).is_err());
    }

    #[test]
    fn pow_roundtrip() {
        let mut rng = TestCsprng::new(3);
        let requirement = PowRequirement { bits: 4, expires_ts: 10_000 };
        let nonce = solve_pow("invite1", "ed25519:joiner", &requirement, &mut rng);
        assert!(verify_pow("invite1", "ed25519:joiner", &nonce, &requirement, 5_000).is_ok());
        assert!(verify_pow("invite1", "ed25519:joiner", &nonce, &requirement, 20_000).is_err());
    }
}
