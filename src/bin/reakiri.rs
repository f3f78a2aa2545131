use anyhow::Result;
use reakiri::cli::{execute, start};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // Start the program
    let (globals, action) = start()?;

    // Handle the action
    execute(globals, action).await
}
