use rename_journal_rs::{
    correlate::RenameCorrelator,
    errors::JournalError,
    journal::{ReadOptions, UsnJournal},
    record::{USN_REASON_RENAME_NEW_NAME, USN_REASON_RENAME_OLD_NAME},
    volume::Volume,
};
use std::time::Duration;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
    }
}

fn run() -> Result<(), JournalError> {
    let drive_letter = 'C';
    let volume = Volume::from_drive_letter(drive_letter)?;

    let mut journal = UsnJournal::new(&volume)?;
    let mut correlator = RenameCorrelator::new();

    // Only rename legs matter here; let the OS-side filter drop the rest.
    let options = ReadOptions {
        reason_mask: USN_REASON_RENAME_OLD_NAME | USN_REASON_RENAME_NEW_NAME,
        ..Default::default()
    };

    println!("watching renames on {}: ...", drive_letter);

    loop {
        match journal.read_batch(&options) {
            Ok(batch) => {
                if batch.is_empty() {
                    std::thread::sleep(Duration::from_millis(500));
                    continue;
                }
                for record in batch.decode_records().records {
                    if let Some(event) = correlator.push(&record) {
                        println!(
                            "usn={}, rename: {} -> {}",
                            event.usn, event.old_name, event.new_name
                        );
                    }
                }
            }
            Err(JournalError::JournalTruncated) | Err(JournalError::JournalIdMismatch) => {
                let resumed = journal.resync()?;
                eprintln!("journal changed under us, resynchronized at usn {}", resumed);
            }
            Err(err) => return Err(err),
        }
    }
}
