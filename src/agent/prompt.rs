//! Prompt builders for every gateway call the agent makes.
//!
//! Reply-format contracts (fenced JSON, closed action vocabulary) live
//! here and in `parser.rs`; keep the two in sync.

/// Action vocabulary + coordinate convention shared by the decision and
/// execute prompts. The sink is a USB HID emulator, so only relative
/// pointer movement exists.
const ACTION_RULES: &str = "\
Coordinate convention: origin at the top-left of the screen, +x to the right, +y down.
The pointer can only be moved RELATIVELY (the emulated device has no absolute positioning).

Available actions:
- {\"action\": \"move\",   \"params\": {\"dx\": <int>, \"dy\": <int>}}
- {\"action\": \"click\",  \"params\": {\"button\": \"left\" | \"right\"}}
- {\"action\": \"type\",   \"params\": {\"text\": \"<string>\"}}
- {\"action\": \"wait\",   \"params\": {\"seconds\": <float>}}
- {\"action\": \"finish\"}

Every action object must also carry a \"thought\" field explaining what you
observed and whether the previous move landed where intended.

Reply with a single fenced ```json code block containing ONE action object,
or an array of action objects to run in order.";

/// Single-model mode: goal + history + the current frame decide the next
/// physical action directly.
pub fn decision_prompt(goal: &str, history_block: &str) -> String {
    format!(
        "You are a desktop control agent observing the user's screen through a camera.\n\
         Goal: \"{goal}\"\n\n\
         Recent actions:\n{history_block}\n\
         Decide the next action. If the target is not under the pointer yet, move first.\n\
         If the pointer is on the target, click. When the goal looks complete, use finish.\n\n\
         {ACTION_RULES}"
    )
}

/// Hybrid plan stage (text-only): break the goal into UI elements to
/// locate. Exactly one element must anchor the current pointer position.
pub fn plan_prompt(goal: &str, history_block: &str) -> String {
    format!(
        "You are the planning stage of a desktop control agent.\n\
         Goal: \"{goal}\"\n\n\
         Recent actions:\n{history_block}\n\
         List the on-screen elements involved in the next step as a JSON array of:\n\
         {{\"targetElement\": \"<short name>\", \"description\": \"<what it looks like>\",\n\
          \"action\": \"move\" | \"click\" | \"type\" | \"wait\" | \"finish\", \"isReference\": <bool>}}\n\n\
         Exactly one element must have isReference=true: the mouse cursor itself,\n\
         used as the zero point for relative movement.\n\
         Reply with a single fenced ```json code block containing the array."
    )
}

/// Hybrid ground stage: one locate query per plan element, sent with the
/// current frame to the grounding model.
pub fn ground_query(target_element: &str, description: &str) -> String {
    format!("Locate on the screenshot: {target_element} ({description})")
}

/// Hybrid execute stage (text-only): turn plan + grounding output into
/// explicit relative displacements. The grounding model reports normalized
/// 0-1 coordinates; the screen resolution is quoted so the model converts
/// them to pixels itself.
pub fn execute_prompt(
    goal: &str,
    plan_block: &str,
    locations_block: &str,
    screen_width: u32,
    screen_height: u32,
) -> String {
    format!(
        "You are the execution stage of a desktop control agent.\n\
         Goal: \"{goal}\"\n\n\
         Plan:\n{plan_block}\n\n\
         Grounding results (raw locator output per element):\n{locations_block}\n\
         The screen is {screen_width}x{screen_height} pixels. Grounding coordinates are\n\
         normalized to 0-1: multiply x by {screen_width} and y by {screen_height} to get pixels.\n\
         Compute each move's dx/dy as the pixel difference from the reference element\n\
         (the cursor) to the target. Emit explicit integers; do not leave displacement\n\
         to be inferred from the image.\n\n\
         {ACTION_RULES}"
    )
}

/// Terminal check: a fresh frame plus a binary question.
pub fn verify_prompt(goal: &str) -> String {
    format!(
        "You are verifying a desktop automation task against the attached screenshot.\n\
         Goal: \"{goal}\"\n\n\
         Is the goal visibly accomplished? Answer strictly with a fenced ```json code\n\
         block: {{\"verified\": true | false, \"reason\": \"<one sentence>\"}}"
    )
}
