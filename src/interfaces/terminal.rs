//! Line-oriented menu over any input and output stream.
//!
//! Reaching end of input quits cleanly from any prompt.

use crate::application::accounts::AccountService;
use crate::application::engine::ShopEngine;
use crate::domain::product::{Product, ProductId};
use crate::domain::user::User;
use crate::error::{Missing, Result, ShopError};
use std::io::{BufRead, Write};

/// Whether the session keeps going after a step.
enum Flow {
    Continue,
    Quit,
}

pub struct Terminal<'a, R, W> {
    engine: &'a ShopEngine,
    accounts: &'a AccountService,
    input: R,
    output: W,
}

impl<'a, R: BufRead, W: Write> Terminal<'a, R, W> {
    pub fn new(engine: &'a ShopEngine, accounts: &'a AccountService, input: R, output: W) -> Self {
        Self {
            engine,
            accounts,
            input,
            output,
        }
    }

    /// Runs the main menu until the user quits or input ends.
    pub async fn run(mut self) -> Result<()> {
        writeln!(self.output, "Welcome to the shop!")?;
        loop {
            writeln!(self.output)?;
            writeln!(self.output, "1. Log in")?;
            writeln!(self.output, "2. Register")?;
            writeln!(self.output, "3. Quit")?;
            let Some(choice) = self.prompt("Choice: ")? else {
                break;
            };
            let flow = match choice.as_str() {
                "1" => self.login().await?,
                "2" => self.register().await?,
                "3" => Flow::Quit,
                _ => {
                    writeln!(self.output, "Invalid choice")?;
                    Flow::Continue
                }
            };
            if let Flow::Quit = flow {
                break;
            }
        }
        writeln!(self.output, "Goodbye!")?;
        self.output.flush()?;
        Ok(())
    }

    async fn login(&mut self) -> Result<Flow> {
        let Some(username) = self.prompt("Username: ")? else {
            return Ok(Flow::Quit);
        };
        let Some(password) = self.prompt("Password: ")? else {
            return Ok(Flow::Quit);
        };
        match self.accounts.authenticate(&username, &password).await {
            Ok(user) => {
                writeln!(self.output, "Logged in as {}", user.username)?;
                self.shop(&user).await
            }
            Err(err) => {
                self.report(&err)?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn register(&mut self) -> Result<Flow> {
        let Some(username) = self.prompt("Username: ")? else {
            return Ok(Flow::Quit);
        };
        let Some(password) = self.prompt("Password: ")? else {
            return Ok(Flow::Quit);
        };
        let Some(personal_number) = self.prompt("Personal number (YYYYMMDDXXXX): ")? else {
            return Ok(Flow::Quit);
        };
        match self
            .accounts
            .register(&username, &password, &personal_number)
            .await
        {
            Ok(user) => writeln!(self.output, "Registered {}, you can now log in", user.username)?,
            Err(err) => self.report(&err)?,
        }
        Ok(Flow::Continue)
    }

    async fn shop(&mut self, user: &User) -> Result<Flow> {
        loop {
            writeln!(self.output)?;
            writeln!(self.output, "1. List products")?;
            writeln!(self.output, "2. Search products")?;
            writeln!(self.output, "3. Add to cart")?;
            writeln!(self.output, "4. Remove from cart")?;
            writeln!(self.output, "5. View cart")?;
            writeln!(self.output, "6. Complete purchase")?;
            writeln!(self.output, "7. Order history")?;
            writeln!(self.output, "8. Log out")?;
            let Some(choice) = self.prompt("Choice: ")? else {
                return Ok(Flow::Quit);
            };
            let flow = match choice.as_str() {
                "1" => self.list_products().await?,
                "2" => self.search_products().await?,
                "3" => self.add_to_cart(user).await?,
                "4" => self.remove_from_cart(user).await?,
                "5" => self.view_cart(user).await?,
                "6" => self.complete_purchase(user).await?,
                "7" => self.order_history(user).await?,
                "8" => {
                    writeln!(self.output, "Logged out")?;
                    return Ok(Flow::Continue);
                }
                _ => {
                    writeln!(self.output, "Invalid choice")?;
                    Flow::Continue
                }
            };
            if let Flow::Quit = flow {
                return Ok(Flow::Quit);
            }
        }
    }

    async fn list_products(&mut self) -> Result<Flow> {
        match self.engine.list_products().await {
            Ok(products) => self.print_products(&products)?,
            Err(err) => self.report(&err)?,
        }
        Ok(Flow::Continue)
    }

    async fn search_products(&mut self) -> Result<Flow> {
        let Some(needle) = self.prompt("Search for: ")? else {
            return Ok(Flow::Quit);
        };
        match self.engine.search_products(&needle).await {
            Ok(products) => self.print_products(&products)?,
            Err(err) => self.report(&err)?,
        }
        Ok(Flow::Continue)
    }

    async fn add_to_cart(&mut self, user: &User) -> Result<Flow> {
        let Some((product_id, quantity)) = self.read_line_item()? else {
            return Ok(Flow::Quit);
        };
        let (Some(product_id), Some(quantity)) = (product_id, quantity) else {
            writeln!(self.output, "Invalid number")?;
            return Ok(Flow::Continue);
        };
        match self.engine.add_to_cart(user.id, product_id, quantity).await {
            Ok(line) => writeln!(
                self.output,
                "Added. You now have {} of product {} in your cart",
                line.quantity.value(),
                product_id
            )?,
            Err(err) => self.report(&err)?,
        }
        Ok(Flow::Continue)
    }

    async fn remove_from_cart(&mut self, user: &User) -> Result<Flow> {
        let Some((product_id, quantity)) = self.read_line_item()? else {
            return Ok(Flow::Quit);
        };
        let (Some(product_id), Some(quantity)) = (product_id, quantity) else {
            writeln!(self.output, "Invalid number")?;
            return Ok(Flow::Continue);
        };
        match self
            .engine
            .remove_from_cart(user.id, product_id, quantity)
            .await
        {
            Ok(()) => writeln!(self.output, "Removed from cart")?,
            Err(err) => self.report(&err)?,
        }
        Ok(Flow::Continue)
    }

    async fn view_cart(&mut self, user: &User) -> Result<Flow> {
        let cart = match self.engine.view_cart(user.id).await {
            Ok(cart) => cart,
            Err(err) => {
                self.report(&err)?;
                return Ok(Flow::Continue);
            }
        };
        if cart.is_empty() {
            writeln!(self.output, "Your cart is empty")?;
            return Ok(Flow::Continue);
        }
        for entry in &cart.entries {
            writeln!(
                self.output,
                "{:>5}  {:<30} {:>4} x {:>10} = {:>10}",
                entry.product_id,
                entry.product_name,
                entry.quantity,
                entry.unit_price.to_string(),
                entry.line_total.to_string()
            )?;
        }
        writeln!(self.output, "Total: {}", cart.total)?;
        Ok(Flow::Continue)
    }

    async fn complete_purchase(&mut self, user: &User) -> Result<Flow> {
        let receipt = match self.engine.complete_purchase(user.id).await {
            Ok(receipt) => receipt,
            Err(err) => {
                self.report(&err)?;
                return Ok(Flow::Continue);
            }
        };
        writeln!(self.output, "Receipt")?;
        for line in &receipt.lines {
            writeln!(
                self.output,
                "Order #{}  {:<30} {:>4} x {:>10} = {:>10}",
                line.order.order_id,
                line.product_name,
                line.order.quantity.value(),
                line.order.unit_price.to_string(),
                line.line_total.to_string()
            )?;
        }
        writeln!(self.output, "Grand total: {}", receipt.grand_total)?;
        writeln!(self.output, "Thank you for your purchase!")?;
        Ok(Flow::Continue)
    }

    async fn order_history(&mut self, user: &User) -> Result<Flow> {
        let history = match self.engine.view_order_history(user.id).await {
            Ok(history) => history,
            Err(err) => {
                self.report(&err)?;
                return Ok(Flow::Continue);
            }
        };
        if history.is_empty() {
            writeln!(self.output, "No orders yet")?;
        }
        for entry in &history {
            writeln!(
                self.output,
                "{}  Order #{}  {:<30} {:>4} x {:>10} = {:>10}",
                entry.placed_at.format("%Y-%m-%d %H:%M"),
                entry.order_id,
                entry.product_name,
                entry.quantity,
                entry.unit_price.to_string(),
                entry.line_total.to_string()
            )?;
        }
        Ok(Flow::Continue)
    }

    fn print_products(&mut self, products: &[Product]) -> Result<()> {
        if products.is_empty() {
            writeln!(self.output, "No products found")?;
            return Ok(());
        }
        writeln!(
            self.output,
            "{:>5}  {:<30} {:>10} {:>6}",
            "Id", "Name", "Price", "Stock"
        )?;
        for product in products {
            writeln!(
                self.output,
                "{:>5}  {:<30} {:>10} {:>6}",
                product.id,
                product.name,
                product.unit_price.to_string(),
                product.stock
            )?;
        }
        Ok(())
    }

    /// Reads a product id and a quantity. `None` means input ended; an inner
    /// `None` means the field was not a number.
    fn read_line_item(&mut self) -> Result<Option<(Option<ProductId>, Option<i64>)>> {
        let Some(product_id) = self.prompt("Product id: ")? else {
            return Ok(None);
        };
        let Some(quantity) = self.prompt("Quantity: ")? else {
            return Ok(None);
        };
        Ok(Some((product_id.parse().ok(), quantity.parse().ok())))
    }

    fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn report(&mut self, err: &ShopError) -> Result<()> {
        writeln!(self.output, "{}", user_message(err))?;
        Ok(())
    }
}

fn user_message(err: &ShopError) -> String {
    match err {
        ShopError::InvalidInput(reason) => reason.clone(),
        ShopError::NotFound(Missing::Product(id)) => format!("There is no product with id {id}"),
        ShopError::NotFound(Missing::CartLine { .. }) => {
            "That product is not in your cart".to_string()
        }
        ShopError::InsufficientStock { available, .. } => {
            format!("Not enough stock, only {available} left")
        }
        ShopError::InsufficientCartQuantity { reserved, .. } => {
            format!("You only have {reserved} of that product in your cart")
        }
        ShopError::EmptyCart => "Your cart is empty".to_string(),
        ShopError::StorageConflict(_) => "The shop is busy, please try again".to_string(),
        ShopError::StorageFailure(_) => {
            "Something went wrong, please try again later".to_string()
        }
        ShopError::AuthFailure => "Wrong username or password".to_string(),
        ShopError::UsernameTaken(name) => format!("The username '{name}' is already taken"),
        ShopError::Underage { minimum_age } => {
            format!("You must be at least {minimum_age} years old to register")
        }
        ShopError::Csv(_) | ShopError::Io(_) | ShopError::Config(_) => err.to_string(),
    }
}
