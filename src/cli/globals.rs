use secrecy::SecretString;

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub provider_url: String,
    pub api_key: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(provider_url: String) -> Self {
        Self {
            provider_url,
            api_key: SecretString::default(),
        }
    }

    pub fn set_api_key(&mut self, api_key: SecretString) {
        self.api_key = api_key;
    }
}
