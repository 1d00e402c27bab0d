use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub type ProjectId = String;
pub type AccountId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Mangrove,
    Seagrass,
    Coral,
    Other,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Mangrove => "mangrove",
            Category::Seagrass => "seagrass",
            Category::Coral => "coral",
            Category::Other => "other",
        };
        f.write_str(name)
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mangrove" => Ok(Category::Mangrove),
            "seagrass" => Ok(Category::Seagrass),
            "coral" => Ok(Category::Coral),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown project category `{other}`")),
        }
    }
}

/// A registered carbon-offset project. Never edited once on chain; a revised
/// CO₂ figure is carried by a new record that `supersedes` the old one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_id: ProjectId,
    pub name: String,
    pub category: Category,
    pub co2_absorbed_tons: u64,
    pub owner_account: AccountId,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub area_ha: u64,
    #[serde(default)]
    pub species: String,
    #[serde(default)]
    pub supersedes: Option<ProjectId>,
}

impl ProjectRecord {
    pub fn new(
        project_id: impl Into<ProjectId>,
        name: impl Into<String>,
        category: Category,
        co2_absorbed_tons: u64,
        owner_account: impl Into<AccountId>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            name: name.into(),
            category,
            co2_absorbed_tons,
            owner_account: owner_account.into(),
            location: String::new(),
            area_ha: 0,
            species: String::new(),
            supersedes: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_area_ha(mut self, area_ha: u64) -> Self {
        self.area_ha = area_ha;
        self
    }

    pub fn with_species(mut self, species: impl Into<String>) -> Self {
        self.species = species.into();
        self
    }

    pub fn superseding(mut self, project_id: impl Into<ProjectId>) -> Self {
        self.supersedes = Some(project_id.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenOperation {
    /// Mint BCT as the reward for a registered project.
    Issue {
        to_account: AccountId,
        amount: u64,
        reason: ProjectId,
    },
    Transfer {
        from_account: AccountId,
        to_account: AccountId,
        amount: u64,
    },
}

impl TokenOperation {
    pub fn issue(to_account: impl Into<AccountId>, amount: u64, reason: impl Into<ProjectId>) -> Self {
        TokenOperation::Issue {
            to_account: to_account.into(),
            amount,
            reason: reason.into(),
        }
    }

    pub fn transfer(
        from_account: impl Into<AccountId>,
        to_account: impl Into<AccountId>,
        amount: u64,
    ) -> Self {
        TokenOperation::Transfer {
            from_account: from_account.into(),
            to_account: to_account.into(),
            amount,
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            TokenOperation::Issue { amount, .. } | TokenOperation::Transfer { amount, .. } => *amount,
        }
    }
}

/// One item of a block payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entry {
    Project(ProjectRecord),
    Token(TokenOperation),
}

impl Entry {
    /// Order-stable JSON encoding used as hash input. Structs serialize their
    /// fields in declaration order and no payload type contains a map.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("payload entries contain no fallible serializers")
    }
}

impl From<ProjectRecord> for Entry {
    fn from(record: ProjectRecord) -> Self {
        Entry::Project(record)
    }
}

impl From<TokenOperation> for Entry {
    fn from(op: TokenOperation) -> Self {
        Entry::Token(op)
    }
}
