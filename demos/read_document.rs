use std::env;

use emrtd_bac::{
    bytes2hex, other_mrz, DataGroup, DataGroupId, DocumentReader, EmrtdError, HashAlgorithm,
    MrzDocument, PcscTransport,
};
use tracing::{error, info};

fn main() -> Result<(), EmrtdError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    // Either a full MRZ or the three fields of the MRZ key.
    let secret = if let Ok(mrz) = env::var("MRZ") {
        let document = MrzDocument::parse(&mrz)?;
        info!("Document: {document}");
        match document.mrz_key() {
            Some(key) => key,
            None => {
                error!("Only passport MRZs carry a BAC key, set DOCNO, BIRTHDATE and EXPIRYDATE instead.");
                std::process::exit(1);
            }
        }
    } else {
        let doc_no = env::var("DOCNO").expect("Please set DOCNO environment variable");
        let birthdate = env::var("BIRTHDATE").expect("Please set BIRTHDATE environment variable");
        let expirydate =
            env::var("EXPIRYDATE").expect("Please set EXPIRYDATE environment variable");
        other_mrz(&doc_no, &birthdate, &expirydate)?
    };

    let reader_name = env::var("READER").ok();
    let transport = match PcscTransport::new(reader_name.as_deref()) {
        Ok(transport) => transport,
        Err(err) => {
            error!("Failed to establish context: {err}");
            std::process::exit(1);
        }
    };
    let reader = DocumentReader::<PcscTransport>::new(transport)
        .with_status_sink(|message| info!("Status: {message}"));

    let groups = reader.read_document(
        &secret,
        &[
            DataGroupId::Com,
            DataGroupId::Sod,
            DataGroupId::Dg1,
            DataGroupId::Dg2,
        ],
    )?;

    for dg in &groups {
        info!("Data from the {}: {}", dg.id(), bytes2hex(dg.raw()));
        info!(
            "SHA-256 of the {}: {}",
            dg.id(),
            bytes2hex(&dg.digest(HashAlgorithm::Sha256)?)
        );
        match dg {
            DataGroup::Com(com) => info!(
                "LDS {} Unicode {} data groups {:?}",
                com.lds_version(),
                com.unicode_version(),
                com.data_groups()
            ),
            DataGroup::Dg1(dg1) => info!(
                "{} {:?}, born {}, document {} expires {}",
                dg1.last_name(),
                dg1.first_names(),
                dg1.date_of_birth(),
                dg1.document_number(),
                dg1.date_of_expiry()
            ),
            DataGroup::Dg2(dg2) => {
                std::fs::write("face.jpg", dg2.face_image()).expect("Error writing file");
                info!("Face image written to face.jpg");
            }
            _ => {}
        }
    }

    Ok(())
}
