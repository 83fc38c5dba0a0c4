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
fn configure_round_trips_option_values() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Widget
        class option Widget -background white
        Widget w
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "w cget -background"), "white");
    eval(&mut interp, &mut oo, "w configure -background red");
    assert_eq!(eval(&mut interp, &mut oo, "w cget -background"), "red");

    // The no-argument listing shows {-name default current}.
    let listing = eval(&mut interp, &mut oo, "w configure");
    assert!(
        listing.contains("-background white red"),
        "listing: {}",
        listing
    );
}

#[test]
fn configure_single_name_returns_one_triple() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Widget
        class option Widget -width 10
        Widget w
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(
        eval(&mut interp, &mut oo, "w configure -width"),
        "-width 10 10"
    );
}

#[test]
fn public_variables_are_configurable() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create P
        class variable P public size 10
        class method P size {} {return $size}
        P p
    "#};
    eval(&mut interp, &mut oo, setup);

    eval(&mut interp, &mut oo, "p configure -size 42");
    assert_eq!(eval(&mut interp, &mut oo, "p cget -size"), "42");
    // The method body sees the same storage cell.
    assert_eq!(eval(&mut interp, &mut oo, "p size"), "42");
}

#[test]
fn protected_variables_are_not_options() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create P
        class variable P protected hidden 1
        P p
    "#};
    eval(&mut interp, &mut oo, setup);

    let err = eval_err(&mut interp, &mut oo, "p cget -hidden");
    assert!(err.contains("unknown option"), "unexpected error: {}", err);
}

#[test]
fn config_code_failure_rolls_back_only_its_pair() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create V
        class option V -speed 1 {if {$checkfail} {error "bad speed"}}
        class option V -label idle
        class variable V public checkfail 0
        V v
    "#};
    eval(&mut interp, &mut oo, setup);

    // With the check disabled the write sticks.
    eval(&mut interp, &mut oo, "v configure -speed 5");
    assert_eq!(eval(&mut interp, &mut oo, "v cget -speed"), "5");

    // Enable the failing check: the -label pair before the failing -speed
    // pair stays applied, the -speed cell rolls back.
    eval(&mut interp, &mut oo, "v configure -checkfail 1");
    let err = eval_err(&mut interp, &mut oo, "v configure -label busy -speed 9");
    assert!(err.contains("bad speed"), "unexpected error: {}", err);
    assert_eq!(eval(&mut interp, &mut oo, "v cget -label"), "busy");
    assert_eq!(eval(&mut interp, &mut oo, "v cget -speed"), "5");
}

#[test]
fn variable_config_code_sees_the_new_value() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create W
        class variable W public level 0 {set ::seen $level}
        W w
        set ::seen unset
    "#};
    eval(&mut interp, &mut oo, setup);

    eval(&mut interp, &mut oo, "w configure -level 7");
    assert_eq!(eval(&mut interp, &mut oo, "set ::seen"), "7");
}

#[test]
fn unknown_option_is_an_error() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create P
        P p
    "#};
    eval(&mut interp, &mut oo, setup);

    let err = eval_err(&mut interp, &mut oo, "p cget -nosuch");
    assert!(err.contains("unknown option \"-nosuch\""), "unexpected error: {}", err);
    let err = eval_err(&mut interp, &mut oo, "p configure -nosuch 1");
    assert!(err.contains("unknown option \"-nosuch\""), "unexpected error: {}", err);
}

#[test]
fn odd_pair_reports_missing_value() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create P
        class option P -a 1
        class option P -b 2
        P p
    "#};
    eval(&mut interp, &mut oo, setup);

    let err = eval_err(&mut interp, &mut oo, "p configure -a 5 -b");
    assert!(err.contains("missing"), "unexpected error: {}", err);
}

#[test]
fn options_inherit_most_specific_first() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Base
        class option Base -color blue
        class create Derived Base
        class option Derived -width 5
        Derived d
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "d cget -color"), "blue");
    let listing = eval(&mut interp, &mut oo, "d configure");
    let width_pos = listing.find("-width").expect("listing lists -width");
    let color_pos = listing.find("-color").expect("listing lists -color");
    assert!(
        width_pos < color_pos,
        "derived options list before base options: {}",
        listing
    );
}
