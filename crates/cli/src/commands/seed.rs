use logicall_core::config::{ConfigOverrides, LoadOptions};
use logicall_store::{seed_defaults, verify_defaults, SqlRecordStore};
use serde_json::json;

use crate::commands::{block_on, load_config, open_store, CommandResult, StepError};

pub fn run(mut options: LoadOptions, tenant_id: Option<String>) -> CommandResult {
    if tenant_id.is_some() {
        options.overrides = ConfigOverrides { tenant_id, ..options.overrides };
    }
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let tenant_id = config.agent.tenant_id.clone();

    let result = block_on("seed", async {
        let pool = open_store(&config).await?;
        let store = SqlRecordStore::new(pool.clone());

        let seeded = seed_defaults(&store, &tenant_id)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5))?;
        let verification = verify_defaults(&store, &tenant_id)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6))?;
        pool.close().await;

        if !verification.all_present {
            return Err(("seed_verification", verification_message(&verification.checks), 6));
        }
        Ok::<_, StepError>(seeded.records.iter().map(ToString::to_string).collect::<Vec<_>>())
    });

    match result {
        Ok(records) => CommandResult::success_with_details(
            "seed",
            format!("seeded {} default records for tenant `{tenant_id}`", records.len()),
            Some(json!({"tenant_id": tenant_id, "records": records})),
        ),
        Err(failure) => failure,
    }
}

fn verification_message(checks: &[(String, bool)]) -> String {
    let missing = checks
        .iter()
        .filter_map(|(key, present)| (!present).then_some(key.as_str()))
        .collect::<Vec<_>>();
    if missing.is_empty() {
        "Some seed records failed to load".to_string()
    } else {
        format!("Seed verification failed for records: {}", missing.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_error_message_targets_missing_records() {
        let checks = vec![
            ("TENANT#acme/PROFILE#DEFAULT".to_string(), true),
            ("PRESET#LLM/ID#gpt-4.1-mini#V#1".to_string(), false),
        ];

        assert_eq!(
            verification_message(&checks),
            "Seed verification failed for records: PRESET#LLM/ID#gpt-4.1-mini#V#1"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic() {
        let checks = vec![("TENANT#acme/PROFILE#DEFAULT".to_string(), true)];

        assert_eq!(verification_message(&checks), "Some seed records failed to load");
    }
}
