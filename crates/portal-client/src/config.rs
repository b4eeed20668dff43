/// Roots of the three backends this client talks to.
///
/// The portal serves the project/workspace REST API, the hub hosts the
/// per-user notebook containers, and the GenePattern server provides the
/// module catalog and OAuth2 endpoints. All paths elsewhere in the crate are
/// joined onto one of these.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub portal_base: String,
    pub hub_base: String,
    pub genepattern_base: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            portal_base: String::new(),
            hub_base: "http://nbdev.genepattern.org/".to_owned(),
            genepattern_base: "https://cloud.genepattern.org/gp/".to_owned(),
        }
    }
}

impl ServerConfig {
    pub fn new<S1, S2, S3>(portal_base: S1, hub_base: S2, genepattern_base: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            portal_base: portal_base.into(),
            hub_base: hub_base.into(),
            genepattern_base: genepattern_base.into(),
        }
    }

    pub fn portal(&self, path: &str) -> String {
        join(&self.portal_base, path)
    }

    pub fn hub(&self, path: &str) -> String {
        join(&self.hub_base, path)
    }

    pub fn genepattern(&self, path: &str) -> String {
        join(&self.genepattern_base, path)
    }
}

fn join(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) if !base.is_empty() => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_avoids_duplicate_slashes() {
        let config = ServerConfig::default();
        assert_eq!(
            config.genepattern("/rest/v1/tasks/all.json"),
            "https://cloud.genepattern.org/gp/rest/v1/tasks/all.json"
        );
        assert_eq!(config.hub("hub/login"), "http://nbdev.genepattern.org/hub/login");
    }

    #[test]
    fn host_relative_portal_paths() {
        let config = ServerConfig::default();
        assert_eq!(config.portal("/rest/projects/"), "/rest/projects/");
    }
}
