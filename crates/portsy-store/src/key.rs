/// Object key layout: `<prefix?>/<project>/blobs/<hex-digest>`.
///
/// Content-addressed, but namespaced by project so per-project access
/// control stays possible on the backing store. Identical content in two
/// projects gets two keys; `copy_if_missing` makes the duplicate cheap.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyScheme {
    prefix: Option<String>,
}

impl KeyScheme {
    pub fn new(prefix: Option<String>) -> Self {
        let prefix = prefix.filter(|p| !p.is_empty()).map(|p| {
            p.trim_matches('/').to_string()
        });
        Self { prefix }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// The key for `hash_hex` under `project`.
    pub fn build(&self, project: &str, hash_hex: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{project}/blobs/{hash_hex}"),
            None => format!("{project}/blobs/{hash_hex}"),
        }
    }
}
