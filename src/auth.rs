use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

const PASSWORD_ENV: &str = "OSENC_PASSWORD";

/// Password for opening an existing container.
pub fn read_password() -> Result<Zeroizing<String>> {
    //  OSENC_PASSWORD="correcthorse" osenc decrypt report.pdf.osenc
    if let Some(pw) = from_env() {
        return Ok(pw);
    }

    //  printf "%s" "$PW" | osenc decrypt report.pdf.osenc
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_line(&mut buf)?;
        trim_newline(&mut buf);
        if !buf.is_empty() {
            return Ok(buf);
        }
    } else {
        let pw = Zeroizing::new(rpassword::prompt_password("Password: ")?);
        if !pw.is_empty() {
            return Ok(pw);
        }
    }

    bail!("no password provided")
}

/// Password for a new container; interactive entry must be typed twice.
pub fn read_new_password_with_confirmation() -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env() {
        return Ok(pw);
    }

    if !io::stdin().is_terminal() {
        let mut pw = Zeroizing::new(String::new());
        io::stdin().lock().read_line(&mut pw)?;
        trim_newline(&mut pw);
        if pw.is_empty() {
            bail!("password cannot be empty");
        }
        return Ok(pw);
    }

    let pw1 = Zeroizing::new(rpassword::prompt_password("New password: ")?);
    let pw2 = Zeroizing::new(rpassword::prompt_password("Confirm password: ")?);

    if pw1.is_empty() {
        bail!("password cannot be empty");
    }
    if pw1 != pw2 {
        bail!("passwords do not match");
    }

    Ok(pw1)
}

fn from_env() -> Option<Zeroizing<String>> {
    std::env::var(PASSWORD_ENV)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
