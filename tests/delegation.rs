use indoc::indoc;

use objsh::{new_shell, Interp, Oo};

fn shell() -> (Interp<Oo>, Oo) {
    new_shell()
}

fn eval(interp: &mut Interp<Oo>, oo: &mut Oo, script: &str) -> String {
    match interp.eval(oo, script) {
        Ok(v) => v.to_string(),
        Err(e) => panic!("script failed: {}\nscript: {}", e.render(), script),
    }
}

fn eval_err(interp: &mut Interp<Oo>, oo: &mut Oo, script: &str) -> String {
    match interp.eval(oo, script) {
        Ok(v) => panic!("expected error, got \"{}\"\nscript: {}", v, script),
        Err(e) => e.value.to_string(),
    }
}

#[test]
fn delegated_option_forwards_to_component() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Hull
        class option Hull -background white
        class create Widget
        class component Widget hull
        class option Widget -background white
        class delegate Widget option -background to hull
        class constructor Widget {} {set hull [Hull #auto]}
        Widget w
    "#};
    eval(&mut interp, &mut oo, setup);

    eval(&mut interp, &mut oo, "w configure -background red");
    assert_eq!(eval(&mut interp, &mut oo, "w cget -background"), "red");

    // The component's own option carries the value: query the hull object
    // directly through the component variable.
    let setup = indoc! {r#"
        class method Widget hullname {} {return $hull}
        set h [w hullname]
    "#};
    eval(&mut interp, &mut oo, setup);
    assert_eq!(eval(&mut interp, &mut oo, "[set h] cget -background"), "red");
}

#[test]
fn named_method_delegation_with_rename() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Engine
        class method Engine start {} {return "engine started"}
        class method Engine stop {} {return "engine stopped"}
        class create Car
        class component Car engine
        class delegate Car method halt to engine as stop
        class constructor Car {} {set engine [Engine #auto]}
        Car c
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "c halt"), "engine stopped");
}

#[test]
fn wildcard_delegation_with_exceptions() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Engine
        class method Engine start {} {return "engine started"}
        class method Engine stop {} {return "engine stopped"}
        class create Car
        class component Car engine
        class method Car start {} {error "should be delegated"}
        class method Car stop {} {return "car stopped"}
        class delegate Car method * to engine except stop
        class constructor Car {} {set engine [Engine #auto]}
        Car c
    "#};
    eval(&mut interp, &mut oo, setup);

    // start is forwarded past the local implementation; stop is excepted
    // and stays local.
    assert_eq!(eval(&mut interp, &mut oo, "c start"), "engine started");
    assert_eq!(eval(&mut interp, &mut oo, "c stop"), "car stopped");
}

#[test]
fn using_template_substitutes_tokens() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Sink
        class method Sink record {args} {set ::got $args}
        class create Src
        class component Src sink
        class delegate Src method send to sink using {%c record %m %n %s}
        class constructor Src {} {set sink [Sink #auto]}
        Src s
    "#};
    eval(&mut interp, &mut oo, setup);

    eval(&mut interp, &mut oo, "s send extra");
    // %m method name, %n class simple name, %s object name, then the
    // call's own arguments.
    assert_eq!(eval(&mut interp, &mut oo, "set ::got"), "send Src ::s extra");
}

#[test]
fn template_percent_escapes() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Sink
        class method Sink record {args} {set ::got $args}
        class create Src
        class component Src sink
        class delegate Src method ping to sink using {%c record 100%%}
        class constructor Src {} {set sink [Sink #auto]}
        Src s
    "#};
    eval(&mut interp, &mut oo, setup);

    eval(&mut interp, &mut oo, "s ping");
    assert_eq!(eval(&mut interp, &mut oo, "set ::got"), "100%");
}

#[test]
fn bad_template_token_fails_at_definition_time() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Src
        class component Src sink
    "#};
    eval(&mut interp, &mut oo, setup);

    let err = eval_err(
        &mut interp,
        &mut oo,
        "class delegate Src method bad to sink using {%z}",
    );
    assert!(err.contains("%z"), "unexpected error: {}", err);
}

#[test]
fn delegated_option_must_be_declared() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create W
        class component W hull
        class delegate W option -missing to hull
    "#};
    eval(&mut interp, &mut oo, setup);

    // The reference to the undeclared option surfaces when the delegation
    // is installed at object creation, not at call time.
    let err = eval_err(&mut interp, &mut oo, "W w");
    assert!(err.contains("-missing"), "unexpected error: {}", err);
}

#[test]
fn delegation_requires_a_declared_component() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create W
        class delegate W method go to nothull
    "#};
    eval(&mut interp, &mut oo, setup);

    let err = eval_err(&mut interp, &mut oo, "W w");
    assert!(err.contains("nothull"), "unexpected error: {}", err);
}

#[test]
fn undefined_component_value_fails_at_call_time() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Car
        class component Car engine
        class method Car start {} {return local}
        class delegate Car method start to engine
        Car c
    "#};
    eval(&mut interp, &mut oo, setup);

    // The delegation installed, but no constructor filled the component.
    let err = eval_err(&mut interp, &mut oo, "c start");
    assert!(err.contains("engine"), "unexpected error: {}", err);
}

#[test]
fn install_hull_substitutes_mid_construction() {
    use objsh::namespace::GLOBAL_NS;
    use objsh::types::{CmdResult, Value};

    // Stands in for the external widget layer: called back from inside a
    // constructor, it swaps a foreign hull command into the object under
    // construction.
    fn cmd_hullinstall(interp: &mut Interp<Oo>, oo: &mut Oo, _token: u64, argv: &[Value]) -> CmdResult {
        assert_eq!(argv.len(), 3, "hullinstall component command");
        objsh::runtime::install_hull(interp, oo, argv[1].as_str(), argv[2].as_str())?;
        Ok(Value::empty())
    }

    let (mut interp, mut oo) = shell();
    interp.add_command(GLOBAL_NS, "hullinstall", cmd_hullinstall, 0);

    let setup = indoc! {r#"
        class create Hull
        class option Hull -background white
        Hull realhull
        class create Panel
        class component Panel hull
        class option Panel -background white
        class delegate Panel option -background to hull
        class constructor Panel {} {hullinstall hull ::realhull}
        Panel p
    "#};
    eval(&mut interp, &mut oo, setup);

    eval(&mut interp, &mut oo, "p configure -background blue");
    assert_eq!(eval(&mut interp, &mut oo, "realhull cget -background"), "blue");

    // Outside a construction the hook has nothing to attach to.
    let err = objsh::runtime::install_hull(&mut interp, &mut oo, "hull", "::realhull")
        .unwrap_err();
    assert!(
        err.value.as_str().contains("no object is being constructed"),
        "unexpected error: {}",
        err.value
    );
}

#[test]
fn hull_installation_swaps_the_component() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Hull
        class option Hull -background white
        class create Frame
        class component Frame hull
        class option Frame -background white
        class delegate Frame option -background to hull
    "#};
    eval(&mut interp, &mut oo, setup);

    // Constructors that call back into the runtime mid-construction mimic
    // the external widget layer substituting a foreign hull.
    eval(&mut interp, &mut oo, "Hull realhull");
    let setup = indoc! {r#"
        class constructor Frame {} {set hull ::realhull}
        Frame f
    "#};
    eval(&mut interp, &mut oo, setup);

    eval(&mut interp, &mut oo, "f configure -background green");
    assert_eq!(eval(&mut interp, &mut oo, "realhull cget -background"), "green");
}
