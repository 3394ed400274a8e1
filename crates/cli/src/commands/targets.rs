use crate::discovery::list_targets;
use crate::error::Result;

/// Prints the page targets as a JSON array.
pub async fn execute(port: u16) -> Result<()> {
	let pages: Vec<_> = list_targets(port).await?.into_iter().filter(|target| target.is_page()).collect();
	println!("{}", serde_json::to_string_pretty(&pages)?);
	Ok(())
}
