#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Model(Option<String>),
    Dir(Option<String>),
    Settings,
    New,
    Clear,
    Help,
    Unknown(String),
}

pub const HELP_TEXT: &str = "Commands:
  /model [name]     show or change the model
  /dir [path]       show or set the project folder (aliases: /folder, /project)
  /config           open settings (alias: /settings)
  /clear            clear messages in place
  /new              start a new chat
  /help             show this help";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut tokens = trimmed.split_whitespace();
    let command = tokens.next().unwrap_or(trimmed).to_string();
    let argument = tokens.collect::<Vec<_>>().join(" ");
    let argument = (!argument.is_empty()).then_some(argument);

    let parsed = match command.to_ascii_lowercase().as_str() {
        "/model" => SlashCommand::Model(argument),
        "/dir" | "/folder" | "/project" => SlashCommand::Dir(argument),
        "/config" | "/settings" => SlashCommand::Settings,
        "/new" => SlashCommand::New,
        "/clear" => SlashCommand::Clear,
        "/help" => SlashCommand::Help,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}
