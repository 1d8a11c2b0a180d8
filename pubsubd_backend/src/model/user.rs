#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ServiceAdmin,
    ProjectAdmin,
    Consumer,
    Publisher,
    PushWorker,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub uuid: String,
    pub name: String,
    pub token: String,
    /// UUIDs of the projects the user belongs to.
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub service_roles: Vec<Role>,
}

impl User {
    pub fn is_push_worker(&self) -> bool {
        self.service_roles.contains(&Role::PushWorker)
    }
}
