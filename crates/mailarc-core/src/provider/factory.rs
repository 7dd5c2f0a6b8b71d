//! Provider service resolution.

use std::sync::Arc;

use super::graph::GraphEmailService;
use super::imap::ImapEmailService;
use super::import::ImportEmailService;
use super::sync::ProviderEngine;
use super::ProviderEmailService;
use crate::accesslog::AccessLogRepository;
use crate::account::{AccountRepository, MailAccountId, ProviderType};
use crate::archive::ArchiveRepository;
use crate::job::PacingConfig;
use crate::Result;

/// Resolves the right provider service for an account.
///
/// Services are built once and shared; they are stateless apart from
/// their repository handles, so one instance per provider suffices.
pub struct ProviderServiceFactory {
    accounts: Arc<AccountRepository>,
    imap: Arc<ImapEmailService>,
    graph: Arc<GraphEmailService>,
    import: Arc<ImportEmailService>,
}

impl ProviderServiceFactory {
    /// Build the factory and its three services.
    #[must_use]
    pub fn new(
        accounts: Arc<AccountRepository>,
        archive: Arc<ArchiveRepository>,
        access_log: Arc<AccessLogRepository>,
        pacing: PacingConfig,
    ) -> Self {
        let core = || {
            ProviderEngine::new(
                Arc::clone(&accounts),
                Arc::clone(&archive),
                Arc::clone(&access_log),
                pacing.clone(),
            )
        };

        Self {
            imap: Arc::new(ImapEmailService::new(core())),
            graph: Arc::new(GraphEmailService::new(core())),
            import: Arc::new(ImportEmailService),
            accounts,
        }
    }

    /// The service for a provider type.
    #[must_use]
    pub fn resolve(&self, provider: ProviderType) -> Arc<dyn ProviderEmailService> {
        match provider {
            ProviderType::Imap => Arc::clone(&self.imap) as Arc<dyn ProviderEmailService>,
            ProviderType::M365 => Arc::clone(&self.graph) as Arc<dyn ProviderEmailService>,
            ProviderType::Import => Arc::clone(&self.import) as Arc<dyn ProviderEmailService>,
        }
    }

    /// The service for a stored account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`](crate::Error::AccountNotFound)
    /// when the account does not exist.
    pub async fn resolve_for_account(
        &self,
        id: MailAccountId,
    ) -> Result<Arc<dyn ProviderEmailService>> {
        let account = self.accounts.get_required(id).await?;
        Ok(self.resolve(account.provider))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::MailAccount;
    use crate::Error;

    async fn factory() -> ProviderServiceFactory {
        ProviderServiceFactory::new(
            Arc::new(AccountRepository::in_memory().await.unwrap()),
            Arc::new(ArchiveRepository::in_memory().await.unwrap()),
            Arc::new(AccessLogRepository::in_memory().await.unwrap()),
            PacingConfig::unpaced(),
        )
    }

    #[tokio::test]
    async fn resolve_matches_provider_type() {
        let factory = factory().await;
        for provider in [ProviderType::Imap, ProviderType::M365, ProviderType::Import] {
            assert_eq!(factory.resolve(provider).provider_type(), provider);
        }
    }

    #[tokio::test]
    async fn resolve_for_unknown_account_fails() {
        let factory = factory().await;
        let err = factory
            .resolve_for_account(MailAccountId::new(99))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(99)));
    }

    #[tokio::test]
    async fn resolve_for_account_uses_stored_provider() {
        let factory = factory().await;
        let mut account = MailAccount::new("Legacy", "alice", ProviderType::Import);
        factory.accounts.save(&mut account).await.unwrap();

        let service = factory
            .resolve_for_account(account.id.unwrap())
            .await
            .unwrap();
        assert_eq!(service.provider_type(), ProviderType::Import);
    }
}
