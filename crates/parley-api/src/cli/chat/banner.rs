//! Welcome banner printed when the chat loop starts.

use std::path::Path;

use console::style;

use parley_types::chat::Chat;

pub fn print_welcome_banner(chat: &Chat, chat_count: usize, data_dir: &Path) {
    println!();
    println!("  {} {}", style("*").cyan().bold(), style("Parley").cyan().bold());
    println!(
        "  {}",
        style(format!("{chat_count} chat(s) in {}", data_dir.display())).dim()
    );
    println!();
    println!(
        "  {}  {} {}",
        style("Chat:").bold(),
        style(&chat.name).cyan(),
        style(format!("#{}", chat.id)).dim()
    );
    println!("  {}  {}", style("Model:").bold(), style(&chat.model).dim());
    println!();
    println!(
        "  {}",
        style("Type /help for commands, Ctrl+C to stop a reply, Ctrl+D to exit").dim()
    );
    println!("  {}", style("---").dim());
    println!();
}
