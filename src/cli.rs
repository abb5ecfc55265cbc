/// Runtime options consumed by the solver. Hosts usually fill this by
/// hand; the reference driver maps its command line onto it.
#[derive(Debug, Clone)]
pub struct Options {
    /// Emit a trace record per goal dispatch through the `log` facade.
    pub trace : bool,
    /// Park equations that fall outside the higher-order pattern
    /// fragment in the constraint store instead of raising an error.
    pub delay_outside_fragment : bool,
    /// Cooperative cancellation bound : one goal dispatch is one step.
    pub max_steps : Option<usize>,
    /// Render the built-in predicate docs instead of solving.
    pub document_builtins : bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            trace : false,
            delay_outside_fragment : false,
            max_steps : None,
            document_builtins : false,
        }
    }
}

/// Scan a raw argument list for the flags this core understands, in their
/// documented single-dash spelling. Flags the core does not recognise are
/// handed back to the host unmodified, in order; a malformed recognised
/// flag (`-max-steps` without a number) is a usage error.
pub fn parse_args(args : &[String]) -> Result<(Options, Vec<String>), String> {
    let mut opts = Options::default();
    let mut rest = Vec::new();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-trace" => opts.trace = true,
            "-delay-outside-fragment" => opts.delay_outside_fragment = true,
            "-document-builtins" => opts.document_builtins = true,
            "-max-steps" => {
                let n = match it.next() {
                    Some(s) => s,
                    None => return Err(String::from("-max-steps expects a number")),
                };
                match n.parse::<usize>() {
                    Ok(n) => opts.max_steps = Some(n),
                    Err(_) => return Err(format!("-max-steps expects a number, got {:?}", n)),
                }
            },
            _ => rest.push(arg.clone()),
        }
    }
    Ok((opts, rest))
}
