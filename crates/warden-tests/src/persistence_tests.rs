//! Snapshot durability under damage: backup recovery and the fatal
//! double-corruption path.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use crate::harness::{MemoryChannel, MockPlatform, TestEnv, GROUP, USER};
    use warden_exchange::BroadcastChannel;
    use warden_service::{PlatformClient, WardenService};

    #[tokio::test]
    async fn test_corrupt_primary_recovers_previous_state() {
        let env = TestEnv::new();
        env.service.warn(GROUP, USER, None, None).await.unwrap();
        env.service.warn(GROUP, USER, None, None).await.unwrap();

        // Damage the newest snapshot; its predecessor is the backup.
        fs::write(env.data_dir().join("ledger.json"), b"{ truncated").unwrap();

        let env = env.restart();
        let record = env.service.ledger().get(USER).unwrap();
        // The backup predates the damaged save, so one warning is lost
        // but the table is intact.
        assert_eq!(record.warnings.get(&GROUP), Some(&1));
    }

    #[tokio::test]
    async fn test_double_corruption_refuses_startup() {
        let env = TestEnv::new();
        env.service.warn(GROUP, USER, None, None).await.unwrap();
        env.service.warn(GROUP, USER, None, None).await.unwrap();

        fs::write(env.data_dir().join("ledger.json"), b"garbage").unwrap();
        fs::write(env.data_dir().join("ledger.json.bak"), b"garbage").unwrap();

        let result = WardenService::new(
            TestEnv::config(env.data_dir()),
            Arc::new(MockPlatform::default()) as Arc<dyn PlatformClient>,
            Arc::new(MemoryChannel::default()) as Arc<dyn BroadcastChannel>,
        );
        assert!(result.is_err(), "startup must refuse corrupted state");
    }

    #[tokio::test]
    async fn test_unsaved_tables_start_empty() {
        let env = TestEnv::new();
        assert!(env.service.ledger().snapshot().unwrap().is_empty());
        assert!(env.service.bad().snapshot().unwrap().is_empty());
        assert!(env.service.reports().snapshot().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_set_persists() {
        let env = TestEnv::new();
        let raw = warden_exchange::Envelope::new(
            warden_core::types::ProcessId::new("MANAGE"),
            vec![warden_core::types::ProcessId::new("WARN")],
            warden_exchange::ExchangeAction::AddBad,
            serde_json::json!({"id": USER.as_u64()}),
        )
        .encode()
        .unwrap();
        env.service.handle_exchange(&raw, None).await.unwrap();

        let env = env.restart();
        assert!(env.service.bad().contains(USER).unwrap());
    }
}
