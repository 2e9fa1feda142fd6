use clap::Parser;
use sheet_insight::core::SheetSource;
use sheet_insight::utils::{logger, validation::Validate};
use sheet_insight::{
    CliConfig, EngineSettings, GatewaySettings, GroqGateway, InsightEngine, InsightError,
    SettingsFile, SpreadsheetSource,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose);
    tracing::info!("Starting sheet-insight");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    let mut gateway_settings = match GatewaySettings::from_env() {
        Ok(settings) => settings,
        Err(e) => return fail(e),
    };

    if let Some(path) = config.settings.clone() {
        match SettingsFile::load(&path) {
            Ok(settings) => {
                settings.apply_to(&mut config);
                settings.apply_to_gateway(&mut gateway_settings);
                tracing::info!("Applied settings from {}", path);
            }
            Err(e) => return fail(e),
        }
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        return fail(e);
    }

    // 創建模型閘道與資料來源
    let gateway = match GroqGateway::new(gateway_settings) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => return fail(e),
    };

    if !gateway.test_connection().await {
        // Non-fatal: every agent has a degradation path, the run can
        // still produce a raw-preview dashboard
        tracing::warn!("⚠️ Model endpoint probe failed, running with degraded interpretation");
    }

    let source = match SpreadsheetSource::new() {
        Ok(source) => source,
        Err(e) => return fail(e),
    };
    tracing::info!("📥 Reading sheets from {}", config.source);
    let sheets = match source.fetch(&config.source).await {
        Ok(sheets) => sheets,
        Err(e) => return fail(InsightError::from(e)),
    };
    tracing::info!("📥 Ingested {} sheets", sheets.len());

    let engine = InsightEngine::new(gateway, EngineSettings::from_provider(&config));
    let report = engine.run(&sheets).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(question) = &config.question {
        let question_sheets = match &config.user {
            Some(user) => {
                let filtered = engine.filter_sheets_for_user(&sheets, &report.mappings, user);
                tracing::info!(
                    "👤 Restricted to rows assigned to '{}' ({} rows total)",
                    user,
                    filtered.iter().map(|s| s.rows.len()).sum::<usize>()
                );
                filtered
            }
            None => sheets.clone(),
        };
        let answer = engine
            .answer(question, &question_sheets, &report.mappings)
            .await;
        println!("{}", serde_json::to_string_pretty(&answer)?);
    }

    tracing::info!("✅ Done");
    Ok(())
}

fn fail(e: InsightError) -> anyhow::Result<()> {
    tracing::error!(
        "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        sheet_insight::utils::error::ErrorSeverity::Low => 0,
        sheet_insight::utils::error::ErrorSeverity::Medium => 2,
        sheet_insight::utils::error::ErrorSeverity::High => 1,
        sheet_insight::utils::error::ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}
