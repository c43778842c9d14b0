//! Outbound reply texts.

pub const PERMISSION_PROMPT: &str = "Would you like to connect to your WhatsApp to check how many groups you are a member of? Reply with \"yes\" or \"כן\" to proceed.";

pub const DECLINED: &str = "You denied permission to connect to your WhatsApp. If you change your mind, send any message to start again.";

pub const PAIRING_REMINDER: &str = "Please enter the pairing code in your WhatsApp app. Once done, reply with \"done\" or \"סיימתי\".";

pub const ALREADY_LINKED: &str = "Your WhatsApp is already linked to this service, no pairing code is needed. Reply with \"done\" or \"סיימתי\" to see your groups.";

pub const PAIRING_FAILED: &str = "There was an error connecting to WhatsApp and no pairing code could be generated. If you already linked a device, reply with \"done\" or \"סיימתי\".";

pub const GROUPS_UNAVAILABLE: &str = "Could not fetch your WhatsApp groups right now. Send any message to try again.";

const LINK_STEPS: &str = "1. Open WhatsApp on your phone\n2. Go to Settings > Linked Devices\n3. Tap on \"Link a Device\"\n4. Enter the pairing code shown above\n\nOnce done, reply with \"done\" or \"סיימתי\".";

pub fn pairing_instructions(code: &str) -> String {
    format!("Please enter this pairing code in your WhatsApp app:\n\n{code}\n\n{LINK_STEPS}")
}

pub fn group_count(count: usize) -> String {
    match count {
        1 => "You are a member of 1 WhatsApp group.".to_string(),
        n => format!("You are a member of {n} WhatsApp groups."),
    }
}

pub fn echo(text: &str) -> String {
    format!("Echo: {text}")
}
