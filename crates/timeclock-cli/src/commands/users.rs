use timeclock_core::{AttendanceLogStore, Identity};

use crate::cli::UsersCommands;
use crate::commands::common::{open_document_store, CommandContext};
use crate::error::CliError;

pub async fn run_users(command: UsersCommands, context: &CommandContext) -> Result<(), CliError> {
    match command {
        UsersCommands::Create { uid } => {
            let user = Identity::new(uid)?;
            let store = AttendanceLogStore::new(open_document_store(&context.client).await?);
            if store.provision_user(&user.uid).await? {
                println!("Created user record users/{}", user.uid);
            } else {
                println!("User record users/{} already exists", user.uid);
            }
            Ok(())
        }
    }
}
