use super::{Output, json_string, yes_no};
use crate::barclamp::BarclampCatalog;
use crate::role::{ActiveProposal, RevisionRace, Role, RoleRegistry};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// A role with everything derived from its name.
#[derive(Serialize)]
pub struct RoleDetail {
    pub name: String,
    pub barclamp: String,
    pub instance: String,
    pub proposal: String,
    pub revision: Option<u64>,
    pub display_name: String,
    pub category: Option<String>,
    pub allows_multiple_proposals: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<Map<String, Value>>,
    pub record: Value,
}

impl RoleDetail {
    fn new(role: &Role, catalog: &BarclampCatalog) -> Result<Self> {
        Ok(Self {
            name: role.name().to_string(),
            barclamp: role.barclamp(),
            instance: role.instance(),
            proposal: role.proposal(),
            revision: role.revision(),
            display_name: role.display_name(catalog),
            category: role.category(catalog).map(str::to_string),
            allows_multiple_proposals: role.allows_multiple_proposals(catalog),
            elements: role.elements().cloned(),
            record: role.to_value()?,
        })
    }
}

/// Result of `role show`. A missing role is not an error.
pub struct RoleShow {
    pub name: String,
    pub role: Option<RoleDetail>,
}

impl Output for RoleShow {
    fn to_json(&self) -> String {
        match &self.role {
            Some(detail) => json_string(detail),
            None => "null".to_string(),
        }
    }

    fn to_human(&self) -> String {
        let Some(detail) = &self.role else {
            return format!("Role {} not found", self.name);
        };
        let mut lines = vec![
            format!("Role: {}", detail.name),
            format!("  Barclamp: {} ({})", detail.barclamp, detail.display_name),
            format!("  Instance: {}", detail.instance),
            format!("  Proposal: {}", detail.proposal),
            format!(
                "  Revision: {}",
                detail
                    .revision
                    .map_or_else(|| "none".to_string(), |r| r.to_string())
            ),
        ];
        if let Some(category) = &detail.category {
            lines.push(format!("  Category: {}", category));
        }
        lines.push(format!(
            "  Multiple proposals: {}",
            yes_no(detail.allows_multiple_proposals)
        ));
        if let Some(elements) = &detail.elements {
            lines.push("  Elements:".to_string());
            for (element, nodes) in elements {
                lines.push(format!("    {}: {}", element, nodes));
            }
        }
        lines.join("\n")
    }
}

/// Look up one role by name.
pub fn role_show(roles: &RoleRegistry, catalog: &BarclampCatalog, name: &str) -> Result<RoleShow> {
    let role = roles
        .find_by_name(name)?
        .map(|role| RoleDetail::new(&role, catalog))
        .transpose()?;
    Ok(RoleShow {
        name: name.to_string(),
        role,
    })
}

/// One line of `role list`.
#[derive(Serialize)]
pub struct RoleSummary {
    pub name: String,
    pub barclamp: String,
    pub revision: Option<u64>,
    pub description: String,
}

#[derive(Serialize)]
pub struct RoleList {
    pub roles: Vec<RoleSummary>,
    pub count: usize,
}

impl Output for RoleList {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.roles.is_empty() {
            return "No roles found.".to_string();
        }
        let mut lines = vec![format!("{} role(s):", self.count)];
        for role in &self.roles {
            let revision = role
                .revision
                .map_or_else(|| "-".to_string(), |r| r.to_string());
            if role.description.is_empty() {
                lines.push(format!("  {} [{}] rev {}", role.name, role.barclamp, revision));
            } else {
                lines.push(format!(
                    "  {} [{}] rev {} - {}",
                    role.name, role.barclamp, revision, role.description
                ));
            }
        }
        lines.join("\n")
    }
}

/// List roles, all of them or those matching a search query.
pub fn role_list(roles: &RoleRegistry, query: Option<&str>) -> Result<RoleList> {
    let roles: Vec<RoleSummary> = roles
        .find_by_search(query)?
        .iter()
        .map(|role| RoleSummary {
            name: role.name().to_string(),
            barclamp: role.barclamp(),
            revision: role.revision(),
            description: role.description().to_string(),
        })
        .collect();
    Ok(RoleList {
        count: roles.len(),
        roles,
    })
}

#[derive(Serialize)]
pub struct ActiveList {
    pub proposals: Vec<ActiveProposal>,
    pub count: usize,
}

impl Output for ActiveList {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.proposals.is_empty() {
            return "No active proposals.".to_string();
        }
        self.proposals
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Active proposals, optionally narrowed to one barclamp and instance.
pub fn role_active(
    roles: &RoleRegistry,
    barclamp: Option<&str>,
    instance: Option<&str>,
) -> Result<ActiveList> {
    let proposals = roles.list_active(barclamp, instance)?;
    Ok(ActiveList {
        count: proposals.len(),
        proposals,
    })
}

#[derive(Serialize)]
pub struct RoleSaved {
    pub name: String,
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub race: Option<RevisionRace>,
}

impl Output for RoleSaved {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("Saved role {} (revision {})", self.name, self.revision);
        if let Some(race) = &self.race {
            out.push_str(&format!(
                "\nWarning: another writer already stored revision {} of {} for {}",
                race.observed, race.barclamp, race.role
            ));
        }
        out
    }
}

/// Save a role read from a JSON file (`-` reads stdin).
pub fn role_save(roles: &RoleRegistry, file: &Path) -> Result<RoleSaved> {
    let contents = if file == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(file)?
    };
    let mut role = Role::from_value(serde_json::from_str(&contents)?)?;
    let outcome = roles.save(&mut role)?;
    Ok(RoleSaved {
        name: role.name().to_string(),
        revision: outcome.revision,
        race: outcome.race,
    })
}

#[derive(Serialize)]
pub struct RoleDestroyed {
    pub name: String,
    pub revision: Option<u64>,
}

impl Output for RoleDestroyed {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!("Destroyed role {}", self.name)
    }
}

/// Delete a role. Destroying a missing role is an error.
pub fn role_destroy(roles: &RoleRegistry, name: &str) -> Result<RoleDestroyed> {
    let role = find_existing(roles, name)?;
    roles.destroy(&role)?;
    Ok(RoleDestroyed {
        name: role.name().to_string(),
        revision: role.revision(),
    })
}

#[derive(Serialize)]
pub struct RoleExported {
    pub name: String,
    pub path: PathBuf,
}

impl Output for RoleExported {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!("Exported role {} to {}", self.name, self.path.display())
    }
}

/// Write a role to `<dir>/role-<name>.json`.
pub fn role_export(roles: &RoleRegistry, name: &str, dir: &Path) -> Result<RoleExported> {
    let role = find_existing(roles, name)?;
    let path = role.export(dir)?;
    Ok(RoleExported {
        name: role.name().to_string(),
        path,
    })
}

fn find_existing(roles: &RoleRegistry, name: &str) -> Result<Role> {
    roles
        .find_by_name(name)?
        .ok_or_else(|| Error::NotFound(format!("role {}", name)))
}
