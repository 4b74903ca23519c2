use crate::infra::{
    load_catalog, spawn_notification_drain, ChannelNotifier, InMemoryObjectStorage,
    LoggingDocumentGenerator,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use clap::Args;
use ods_licensing::config::AppConfig;
use ods_licensing::error::AppError;
use ods_licensing::workflows::licensing::{
    Clock, Collaborators, CounterName, FixedClock, ImportApproval, ImporterAccount, ImporterId,
    InMemoryLicensingStore, LicensingError, LicensingService, LicensingStore, LineItemRequest,
    ObjectReference, SignatureImage,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Date the registration window is visited (YYYY-MM-DD). Defaults to December 1 of this year.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) window_date: Option<NaiveDate>,
    /// Yearly CO2-equivalent allowance for the demo importer (kg CO2e)
    #[arg(long, default_value_t = 100_000.0)]
    pub(crate) quota: f64,
    /// Number of officers approving the same import at once
    #[arg(long, default_value_t = 4)]
    pub(crate) contenders: usize,
    /// Print the final state as JSON instead of a summary
    #[arg(long)]
    pub(crate) json: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            window_date: None,
            quota: 100_000.0,
            contenders: 4,
            json: false,
        }
    }
}

#[derive(Serialize)]
struct DemoReport {
    registration_year: i32,
    certificate_number: Option<u64>,
    importer_number: u64,
    approval: ImportApproval,
    rejected_attempts: usize,
    stored_objects: Vec<String>,
    notifications: usize,
}

fn at_nine(date: NaiveDate) -> Result<DateTime<Utc>, AppError> {
    date.and_hms_opt(9, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| {
            AppError::from(LicensingError::Validation(format!(
                "{date} has no 09:00 timestamp"
            )))
        })
}

fn calendar_date(year: i32, month: u32, day: u32) -> Result<NaiveDate, AppError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        AppError::from(LicensingError::Validation(format!(
            "{year}-{month}-{day} is not a calendar date"
        )))
    })
}

pub(crate) async fn run_demo(config: &AppConfig, args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        window_date,
        quota,
        contenders,
        json,
    } = args;

    let settings = config.licensing.engine_settings();
    let window_date = match window_date {
        Some(date) => date,
        None => calendar_date(Utc::now().year(), settings.window.month, 1)?,
    };
    let clock = Arc::new(FixedClock::new(at_nine(window_date)?));
    let registration_year = settings
        .window
        .open_year(window_date)
        .ok_or_else(|| {
            AppError::from(LicensingError::Validation(format!(
                "registration window is closed on {window_date}"
            )))
        })?;

    let store = Arc::new(InMemoryLicensingStore::with_seeds(config.licensing.seeds));
    let catalog = Arc::new(load_catalog(config.licensing.catalog_path.as_deref())?);
    let (notifier, receiver) = ChannelNotifier::new();
    let drain = spawn_notification_drain(receiver);
    let objects = Arc::new(InMemoryObjectStorage::default());
    let collaborators = Collaborators {
        clock: clock.clone(),
        notifier: Arc::new(notifier),
        documents: Arc::new(LoggingDocumentGenerator),
        objects: objects.clone(),
    };
    let service = Arc::new(LicensingService::new(
        store.clone(),
        catalog,
        collaborators,
        settings,
    ));

    info!(
        window_month = service.registrations().window().month,
        override_open = service.registrations().window().override_open,
        quota_policy = ?service.ledger().policy(),
        refrigerants = service.catalog().len(),
        "licensing engine ready"
    );

    let importer = ImporterId("importer-demo".to_string());
    store
        .insert_account(ImporterAccount::new(importer.clone(), quota))
        .map_err(LicensingError::from)?;
    let importer_number = service.ledger().assign_importer_number(&importer)?;

    let registrations = service.registrations();
    let submitted = registrations.submit(
        &importer,
        registration_year,
        &["R-134a".to_string(), "R-410A".to_string()],
        false,
    )?;
    let registration = registrations.approve(&submitted.id, "officer.demo")?.registration;
    println!(
        "Registration {} approved for {} with certificate #{}",
        registration.id,
        registration.year,
        registration.certificate_number().unwrap_or_default()
    );

    clock.set(at_nine(calendar_date(registration_year, 2, 10)?)?);
    let imports = service.imports();
    let import = imports.submit(
        &importer,
        &registration.id,
        vec![
            LineItemRequest {
                refrigerant_code: "R-134a".to_string(),
                quantity: 1,
                volume: 50.0,
                unit: "kg".to_string(),
            },
            LineItemRequest {
                refrigerant_code: "R-410A".to_string(),
                quantity: 2,
                volume: 1.0,
                unit: "lb".to_string(),
            },
        ],
    )?;
    println!(
        "Import #{} submitted: {:.2} kg CO2e across {} line items",
        import.import_number,
        import.total_co2_equivalent,
        import.line_items.len()
    );

    imports.mark_arrived(
        &import.id,
        vec![ObjectReference {
            key: format!("documents/{}/bill-of-lading.pdf", import.id),
            content_type: "application/pdf".to_string(),
        }],
    )?;
    imports.schedule_inspection(&import.id, clock.now() + Duration::days(2))?;

    let mut handles = Vec::with_capacity(contenders.max(1));
    for officer in 0..contenders.max(1) {
        let service = service.clone();
        let id = import.id.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            service.imports().approve(
                &id,
                &format!("officer.{officer}"),
                SignatureImage {
                    content_type: "image/png".to_string(),
                    bytes: format!("signed by officer {officer}").into_bytes(),
                },
            )
        }));
    }

    let mut approval = None;
    let mut rejected_attempts = 0;
    for handle in handles {
        match handle.await {
            Ok(Ok(result)) => approval = Some(result),
            Ok(Err(err @ LicensingError::InvalidState { .. })) => {
                rejected_attempts += 1;
                info!(error = %err, "competing approval refused");
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(err) => {
                warn!(error = %err, "approval task did not complete");
                rejected_attempts += 1;
            }
        }
    }
    let approval = approval.ok_or_else(|| {
        AppError::from(LicensingError::ConcurrencyConflict(format!(
            "no approval of import {} completed",
            import.id
        )))
    })?;

    let certificate_number = registration.certificate_number();
    let issued = service.counters().peek(CounterName::ImportLicense)?;
    let stored_objects = objects.keys();
    drop(service);

    let notifications = drain.await.map(|sent| sent.len()).unwrap_or_else(|err| {
        warn!(error = %err, "notification drain did not finish");
        0
    });

    if json {
        let report = DemoReport {
            registration_year,
            certificate_number,
            importer_number,
            approval,
            rejected_attempts,
            stored_objects,
            notifications,
        };
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
        println!("{rendered}");
        return Ok(());
    }

    println!(
        "Import #{} approved by {} ({} competing approvals refused)",
        approval.import.import_number,
        approval
            .import
            .transitions
            .last()
            .and_then(|record| record.actor.as_deref())
            .unwrap_or("unknown"),
        rejected_attempts
    );
    println!(
        "Importer #{importer_number}: quota {:.2} | used {:.2} | balance {:.2}",
        approval.account.import_quota,
        approval.account.cumulative_imports,
        approval.account.balance()
    );
    if approval.debit.overage > 0.0 {
        println!("  over quota by {:.2} kg CO2e", approval.debit.overage);
    }
    if let Some(document) = &approval.license_document {
        println!("License document: {}", document.key);
    }
    println!("Import numbers issued: {issued}");
    println!("Stored objects: {}", stored_objects.join(", "));
    println!("Notifications delivered: {notifications}");
    Ok(())
}
