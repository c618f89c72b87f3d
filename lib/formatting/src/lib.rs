use serror::Serror;

/// Render an error chain into the plain-text block stored in
/// operation log rows and error messages.
pub fn format_serror(Serror { error, trace }: &Serror) -> String {
  let trace = if !trace.is_empty() {
    let mut out = String::from("\n\nTRACE:");

    for (i, msg) in trace.iter().enumerate() {
      out.push_str(&format!("\n\t{}: {msg}", i + 1));
    }

    out
  } else {
    Default::default()
  };
  format!("ERROR: {error}{trace}")
}
