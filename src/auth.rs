use serde::{Deserialize, Serialize};

/// Role claimed by the caller. Verifying the claim against a real identity is
/// the identity provider's job; this module only decides what a given role may
/// do and who owns what.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Company,
    Candidate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    /// Only meaningful for company actors: the company name their allocations
    /// are recorded under.
    pub company_name: Option<String>,
}

#[derive(Debug)]
pub struct Forbidden(pub String);

impl std::fmt::Display for Forbidden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "forbidden: {}", self.0)
    }
}

impl std::error::Error for Forbidden {}

/// Role gate for write operations. Admins pass every gate. Demo mode never
/// bypasses this check; it only relaxes `require_identified` on reads.
pub fn require_role(actor: &Actor, required: Role) -> Result<(), Forbidden> {
    if actor.role == Role::Admin || actor.role == required {
        Ok(())
    } else {
        Err(Forbidden(format!(
            "operation requires {:?} role, caller is {:?}",
            required, actor.role
        )))
    }
}

/// Gate for read endpoints: any identified caller, or anyone in demo mode.
pub fn require_identified(user_id: Option<&str>, demo_mode: bool) -> Result<(), Forbidden> {
    if demo_mode {
        return Ok(());
    }
    match user_id {
        Some(id) if !id.trim().is_empty() => Ok(()),
        _ => Err(Forbidden("caller is not identified".to_string())),
    }
}

/// The company name an actor operates as. Companies must carry one; admins may
/// act for any company they name explicitly.
pub fn acting_company<'a>(actor: &'a Actor, named: Option<&'a str>) -> Result<&'a str, Forbidden> {
    match actor.role {
        Role::Admin => named
            .or(actor.company_name.as_deref())
            .ok_or_else(|| Forbidden("admin must name the company to act for".to_string())),
        Role::Company => actor
            .company_name
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Forbidden("company actor has no company name".to_string())),
        Role::Candidate => Err(Forbidden("candidates cannot act for a company".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role, company: Option<&str>) -> Actor {
        Actor {
            user_id: "u1".to_string(),
            role,
            company_name: company.map(|c| c.to_string()),
        }
    }

    #[test]
    fn admin_passes_every_role_gate() {
        let a = actor(Role::Admin, None);
        assert!(require_role(&a, Role::Admin).is_ok());
        assert!(require_role(&a, Role::Company).is_ok());
        assert!(require_role(&a, Role::Candidate).is_ok());
    }

    #[test]
    fn candidate_cannot_pass_company_gate() {
        let a = actor(Role::Candidate, None);
        assert!(require_role(&a, Role::Company).is_err());
        assert!(require_role(&a, Role::Candidate).is_ok());
    }

    #[test]
    fn demo_mode_only_relaxes_reads() {
        assert!(require_identified(None, true).is_ok());
        assert!(require_identified(None, false).is_err());
        assert!(require_identified(Some(""), false).is_err());
        assert!(require_identified(Some("u9"), false).is_ok());
        // Role gates are unaffected by demo mode by construction: they never
        // consult it.
        let a = actor(Role::Candidate, None);
        assert!(require_role(&a, Role::Admin).is_err());
    }

    #[test]
    fn acting_company_resolution() {
        let company = actor(Role::Company, Some("Acme"));
        assert_eq!(acting_company(&company, None).unwrap(), "Acme");

        let admin = actor(Role::Admin, None);
        assert_eq!(acting_company(&admin, Some("Globex")).unwrap(), "Globex");
        assert!(acting_company(&admin, None).is_err());

        let candidate = actor(Role::Candidate, None);
        assert!(acting_company(&candidate, Some("Acme")).is_err());
    }
}
