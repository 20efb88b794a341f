use crate::infra::{
    InMemoryObjectStorage, InMemorySubscriptions, InMemoryVerificationRepository,
    LoggingRegulatorNotifier, TextLayerOcr,
};
use crate::server::DOCUMENT_BUCKET;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Args;
use neurocare::error::AppError;
use neurocare::workflows::verification::router::parse_schedule;
use neurocare::workflows::verification::{
    Actor, AdminReviewService, AdminSession, Collaborators, DiplomaDetails, DocumentId,
    DocumentType, EducatorProfile, EducatorRegistration, EducatorVerificationService, FileUpload,
    Role, SubscriptionGate, SubscriptionLimits, VerificationError, VerificationMethod,
    VerificationRepository, VerificationSettings,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEMO_EDUCATOR: &str = "demo-educator";
const DEMO_ADMIN: &str = "demo-admin";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Route the diploma through the DREETS regional authority
    #[arg(long)]
    pub(crate) dreets: bool,
    /// Region sent with a DREETS diploma
    #[arg(long, default_value = "Occitanie")]
    pub(crate) region: String,
    /// Diploma scan to upload instead of the built-in sample (image or PDF)
    #[arg(long)]
    pub(crate) diploma: Option<PathBuf>,
    /// Interview date, RFC 3339 or YYYY-MM-DDTHH:MM (defaults to one week from now)
    #[arg(long, value_parser = parse_schedule)]
    pub(crate) interview_date: Option<DateTime<Utc>>,
    /// Reject the criminal record instead of approving it
    #[arg(long)]
    pub(crate) reject_criminal_record: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        dreets,
        region,
        diploma,
        interview_date,
        reject_criminal_record,
    } = args;

    let repository = Arc::new(InMemoryVerificationRepository::default());
    let regulator = Arc::new(LoggingRegulatorNotifier::default());
    let collaborators = Collaborators::new(
        Arc::new(InMemoryObjectStorage::new(DOCUMENT_BUCKET)),
        Arc::new(TextLayerOcr),
        regulator.clone(),
    );
    let settings = VerificationSettings::default();
    let educators =
        EducatorVerificationService::new(repository.clone(), collaborators.clone(), settings.clone());
    let review = AdminReviewService::new(repository, collaborators, settings);

    let educator = Actor::new(DEMO_EDUCATOR, Role::Educator);
    let admin = Actor::new(DEMO_ADMIN, Role::Admin);
    let method = if dreets {
        VerificationMethod::Dreets
    } else {
        VerificationMethod::Standard
    };

    println!("Educator verification demo");
    let profile = educators.register(
        &educator,
        EducatorRegistration {
            first_name: "Camille".to_string(),
            last_name: "Moreau".to_string(),
            email: "camille.moreau@example.org".to_string(),
            phone: None,
            verification_method: method,
        },
    )?;
    print_step("Registered", &profile);

    let diploma_upload = match diploma {
        Some(path) => read_upload(&path)?,
        None => sample_upload(
            "diplome.pdf",
            "Diplome d'Etat d'Educateur Specialise DEES-2021-0042",
        ),
    };
    let outcome = educators.submit_diploma(
        &educator,
        &profile.id,
        diploma_upload,
        DiplomaDetails {
            diploma_number: Some("DEES-2021-0042".to_string()),
            delivery_date: NaiveDate::from_ymd_opt(2021, 6, 30),
            region: dreets.then_some(region),
        },
    )?;
    match &outcome.analysis {
        Some(analysis) => println!(
            "- Diploma analysed: confidence {:.0}% | valid={} | issues={:?}",
            analysis.confidence * 100.0,
            analysis.validation.is_valid,
            analysis.validation.issues
        ),
        None => println!("- Diploma stored without OCR analysis"),
    }
    if outcome.regulator_notified {
        println!("- DREETS notified ({} request(s) queued)", regulator.sent());
    }

    let mut documents: BTreeMap<DocumentType, DocumentId> = BTreeMap::new();
    documents.insert(DocumentType::Diploma, outcome.document.id.clone());
    for (kind, file_name) in [
        (DocumentType::CriminalRecord, "extrait-casier-b3.pdf"),
        (DocumentType::IdCard, "carte-identite.pdf"),
        (DocumentType::Insurance, "attestation-rc-pro.pdf"),
    ] {
        let document = educators.upload_document(
            &educator,
            &profile.id,
            kind,
            sample_upload(file_name, kind.label()),
        )?;
        println!("- Uploaded {} -> {}", kind, document.storage_path);
        documents.insert(kind, document.id);
    }
    let overview = educators.overview(&educator, &profile.id)?;
    println!("  Status after uploads: {}", overview.status);

    let session = review.authorize(&admin).map_err(VerificationError::from)?;
    for kind in [
        DocumentType::Diploma,
        DocumentType::IdCard,
        DocumentType::Insurance,
    ] {
        let decision = session.approve_document(&documents[&kind])?;
        println!(
            "- Admin approved {} -> educator {}",
            kind, decision.profile.verification_status
        );
    }

    let criminal_record = &documents[&DocumentType::CriminalRecord];
    if reject_criminal_record {
        let decision = session.reject_document(criminal_record, "Casier non vierge")?;
        print_step("Criminal record rejected", &decision.profile);
        return print_history(&session, &decision.profile);
    }
    let decision = session.approve_document(criminal_record)?;
    print_step("Criminal record approved", &decision.profile);

    let date = interview_date.unwrap_or_else(|| Utc::now() + Duration::days(7));
    let scheduled =
        session.schedule_interview(&profile.id, Some(date), Some("Visio de 30 minutes".to_string()))?;
    print_step("Interview scheduled", &scheduled);

    let verified = session.approve_educator(&profile.id)?;
    print_step("Educator approved", &verified);

    let public = educators.public_profile(&profile.id)?;
    match serde_json::to_string_pretty(&public) {
        Ok(json) => println!("  Public profile payload:\n{}", json),
        Err(err) => println!("  Public profile payload unavailable: {}", err),
    }

    let subscriptions = Arc::new(InMemorySubscriptions::default());
    let gate = SubscriptionGate::new(subscriptions.clone(), SubscriptionLimits::default());
    println!(
        "  Free tier: 4th conversation {:?} | 3rd booking {:?}",
        gate.can_open_conversation(&profile.id, 3),
        gate.can_accept_booking(&profile.id, 2)
    );
    subscriptions.activate(profile.id.clone(), "premium");
    println!(
        "  Premium: 4th conversation {:?} | 3rd booking {:?}",
        gate.can_open_conversation(&profile.id, 3),
        gate.can_accept_booking(&profile.id, 2)
    );

    print_history(&session, &verified)
}

fn print_step(label: &str, profile: &EducatorProfile) {
    let visibility = profile.visibility();
    println!(
        "- {}: {} | badge={} | visible={}",
        label,
        profile.verification_status,
        visibility.verification_badge,
        visibility.profile_visible
    );
}

fn print_history<R>(session: &AdminSession<'_, R>, profile: &EducatorProfile) -> Result<(), AppError>
where
    R: VerificationRepository + 'static,
{
    let history = session.criminal_record_history(&profile.id)?;
    println!("  Criminal record audit trail:");
    for entry in history {
        println!(
            "    - {} clean={} reviewer={} notes={}",
            entry.verified_at.format("%Y-%m-%d %H:%M"),
            entry.is_clean,
            entry.reviewer.0,
            entry.notes.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn sample_upload(file_name: &str, text: &str) -> FileUpload {
    FileUpload::new(
        file_name,
        Some("application/pdf".to_string()),
        format!("%PDF-1.4 {text}").into_bytes(),
    )
}

fn read_upload(path: &Path) -> Result<FileUpload, AppError> {
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "diploma".to_string());
    let content_type = mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string());
    Ok(FileUpload::new(file_name, content_type, bytes))
}
